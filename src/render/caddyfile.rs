use caddyfile_rs::{Caddyfile, Directive, SiteBlock, format};

use crate::render::compose::APP_SERVICE;
use crate::spec::DeploymentSpec;

/// Render the Caddyfile: one site for the deployment's FQDN with
/// automatic certificates issued to the ACME email, proxying to n8n.
#[must_use]
pub fn render(spec: &DeploymentSpec) -> String {
    let upstream = format!("{APP_SERVICE}:{}", spec.app_port);
    let tls = format!("tls {}", spec.acme_email);

    let site = SiteBlock::new(&spec.fqdn())
        .directive(Directive::new(&tls))
        .reverse_proxy(&upstream)
        .encode_gzip()
        .security_headers();

    let caddyfile = Caddyfile::new().site(site);
    format(&caddyfile)
}

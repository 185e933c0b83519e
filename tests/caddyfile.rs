use caddyfile_rs::{parse, tokenize};
use n8n_deploy::DeploymentSpec;
use n8n_deploy::render::caddyfile;

#[test]
fn full_caddyfile() {
    let spec = DeploymentSpec::new("example.com", "automation").acme_email("certs@example.com");

    let result = caddyfile::render(&spec);

    assert!(result.contains("automation.example.com {"));
    assert!(result.contains("tls certs@example.com"));
    assert!(result.contains("reverse_proxy n8n:5678"));
    assert!(result.contains("encode gzip"));
    assert!(result.contains("X-Frame-Options"));
}

#[test]
fn default_acme_email_uses_domain() {
    let spec = DeploymentSpec::new("example.org", "n8n");

    let result = caddyfile::render(&spec);

    assert!(result.contains("tls admin@example.org"));
}

#[test]
fn round_trip_parse() {
    let spec = DeploymentSpec::new("example.com", "n8n");

    let rendered = caddyfile::render(&spec);
    let tokens = tokenize(&rendered).expect("tokenize failed");
    let parsed = parse(&tokens).expect("parse failed");

    assert_eq!(parsed.sites.len(), 1);
}

use std::fmt::Write;

use crate::spec::DeploymentSpec;

/// Render the `.env` file shared by the n8n and postgres containers.
///
/// Every value appears byte for byte. Values holding characters the
/// compose env-file parser would interpret (`$`, quotes, spaces, `#`)
/// are wrapped in single quotes, which compose reads literally.
#[must_use]
pub fn render(spec: &DeploymentSpec) -> String {
    let fqdn = spec.fqdn();
    let webhook = format!("{}/", spec.url());
    let (auth_active, auth_user, auth_password) = match &spec.basic_auth {
        Some(auth) => ("true", auth.user.as_str(), auth.password.expose()),
        None => ("false", "", ""),
    };

    let entries: [(&str, &str); 12] = [
        ("N8N_HOST", &fqdn),
        ("N8N_PROTOCOL", "https"),
        ("WEBHOOK_URL", &webhook),
        ("N8N_BASIC_AUTH_ACTIVE", auth_active),
        ("N8N_BASIC_AUTH_USER", auth_user),
        ("N8N_BASIC_AUTH_PASSWORD", auth_password),
        ("N8N_ENCRYPTION_KEY", spec.encryption_key.expose()),
        ("DB_POSTGRESDB_PASSWORD", spec.db_password.expose()),
        ("POSTGRES_USER", &spec.db_user),
        ("POSTGRES_PASSWORD", spec.db_password.expose()),
        ("POSTGRES_DB", &spec.db_name),
        ("N8N_RUNNERS_ENABLED", "true"),
    ];

    let mut out = String::new();
    for (key, value) in entries {
        let _ = writeln!(out, "{key}={}", env_value(value));
    }
    out
}

/// Quote a value for a compose env file when needed.
#[must_use]
pub fn env_value(value: &str) -> String {
    let plain = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:@+,=".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{value}'")
    }
}

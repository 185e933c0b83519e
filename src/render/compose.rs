use docker_compose_types::{
    Compose, ComposeNetworks, ComposeVolume, DependsCondition, DependsOnOptions, Environment,
    Healthcheck, HealthcheckTest, Labels, MapOrEmpty, NetworkSettings, Networks, Ports, Service,
    Services, StringOrList, TopLevelVolumes, Volumes,
};
use indexmap::IndexMap;

use crate::error::DeployResult;
use crate::spec::DeploymentSpec;

pub const NETWORK: &str = "n8n-network";
pub const APP_SERVICE: &str = "n8n";
pub const DB_SERVICE: &str = "postgres";
pub const PROXY_SERVICE: &str = "caddy";

const ENV_FILE: &str = ".env";

/// Render `docker-compose.yml` for the n8n, PostgreSQL and Caddy
/// stack. Secrets stay in the environment file; this manifest only
/// references it.
pub fn render(spec: &DeploymentSpec) -> DeployResult<String> {
    let mut services = IndexMap::new();
    services.insert(PROXY_SERVICE.to_string(), Some(caddy_service()));
    services.insert(APP_SERVICE.to_string(), Some(n8n_service(spec)));
    services.insert(DB_SERVICE.to_string(), Some(postgres_service(spec)));

    let compose = Compose {
        services: Services(services),
        volumes: top_level_volumes(),
        networks: network(),
        ..Default::default()
    };

    Ok(serde_yaml::to_string(&compose)?)
}

fn caddy_service() -> Service {
    let mut depends = IndexMap::new();
    depends.insert(APP_SERVICE.to_string(), DependsCondition::service_healthy());

    Service {
        image: Some("caddy:2-alpine".to_string()),
        container_name: Some("n8n-caddy".to_string()),
        restart: Some("unless-stopped".to_string()),
        ports: Ports::Short(vec!["80:80".to_string(), "443:443".to_string()]),
        volumes: vec![
            Volumes::Simple("./Caddyfile:/etc/caddy/Caddyfile:ro".to_string()),
            Volumes::Simple("caddy-data:/data".to_string()),
            Volumes::Simple("caddy-config:/config".to_string()),
        ],
        depends_on: DependsOnOptions::Conditional(depends),
        networks: Networks::Simple(vec![NETWORK.to_string()]),
        ..Default::default()
    }
}

fn n8n_service(spec: &DeploymentSpec) -> Service {
    let mut depends = IndexMap::new();
    depends.insert(DB_SERVICE.to_string(), DependsCondition::service_healthy());

    let environment = Environment::List(vec![
        format!("N8N_PORT={}", spec.app_port),
        format!("GENERIC_TIMEZONE={}", spec.timezone),
        format!("TZ={}", spec.timezone),
        "DB_TYPE=postgresdb".to_string(),
        format!("DB_POSTGRESDB_HOST={DB_SERVICE}"),
        "DB_POSTGRESDB_PORT=5432".to_string(),
        format!("DB_POSTGRESDB_DATABASE={}", spec.db_name),
        format!("DB_POSTGRESDB_USER={}", spec.db_user),
    ]);

    Service {
        image: Some(spec.n8n_image()),
        container_name: Some("n8n".to_string()),
        restart: Some("unless-stopped".to_string()),
        expose: vec![spec.app_port.to_string()],
        env_file: Some(StringOrList::Simple(ENV_FILE.to_string())),
        environment,
        volumes: vec![Volumes::Simple("n8n-data:/home/node/.n8n".to_string())],
        healthcheck: Some(healthcheck(format!(
            "wget -q --spider http://localhost:{}/healthz || exit 1",
            spec.app_port
        ))),
        depends_on: DependsOnOptions::Conditional(depends),
        networks: Networks::Simple(vec![NETWORK.to_string()]),
        ..Default::default()
    }
}

fn postgres_service(spec: &DeploymentSpec) -> Service {
    Service {
        image: Some(spec.postgres_image()),
        container_name: Some("n8n-postgres".to_string()),
        restart: Some("unless-stopped".to_string()),
        env_file: Some(StringOrList::Simple(ENV_FILE.to_string())),
        volumes: vec![Volumes::Simple(
            "postgres-data:/var/lib/postgresql/data".to_string(),
        )],
        // `$$` keeps compose from interpolating; the container shell
        // expands the variables from the env file.
        healthcheck: Some(healthcheck(
            "pg_isready -U \"$$POSTGRES_USER\" -d \"$$POSTGRES_DB\"".to_string(),
        )),
        networks: Networks::Simple(vec![NETWORK.to_string()]),
        ..Default::default()
    }
}

fn healthcheck(command: String) -> Healthcheck {
    Healthcheck {
        test: Some(HealthcheckTest::Multiple(vec![
            "CMD-SHELL".to_string(),
            command,
        ])),
        interval: Some("30s".to_string()),
        timeout: Some("10s".to_string()),
        retries: 5,
        start_period: Some("30s".to_string()),
        ..Default::default()
    }
}

fn local_volume() -> ComposeVolume {
    ComposeVolume {
        driver: Some("local".to_string()),
        driver_opts: IndexMap::new(),
        external: None,
        labels: Labels::default(),
        name: None,
    }
}

fn top_level_volumes() -> TopLevelVolumes {
    let mut vols = IndexMap::new();
    for name in ["n8n-data", "postgres-data", "caddy-data", "caddy-config"] {
        vols.insert(name.to_string(), MapOrEmpty::Map(local_volume()));
    }
    TopLevelVolumes(vols)
}

fn network() -> ComposeNetworks {
    let mut nets = IndexMap::new();
    nets.insert(
        NETWORK.to_string(),
        MapOrEmpty::Map(NetworkSettings {
            driver: Some("bridge".to_string()),
            ..Default::default()
        }),
    );
    ComposeNetworks(nets)
}

mod common;

use std::path::PathBuf;

use common::{FakeCloud, a_record, droplet};
use n8n_deploy::DeploymentSpec;
use n8n_deploy::keys::{KeyPair, PrivateKey};
use n8n_deploy::reconcile::{Action, ResourceReconciler};

fn spec() -> DeploymentSpec {
    DeploymentSpec::new("example.com", "n8n")
}

fn key() -> KeyPair {
    KeyPair {
        name: "n8n-deploy".to_string(),
        provider_id: 42,
        public_key: "ssh-ed25519 AAAA n8n-deploy".to_string(),
        fingerprint: "fp".to_string(),
        private_key: PrivateKey::new(PathBuf::from("/keys/n8n-deploy")),
    }
}

#[tokio::test]
async fn instance_created_once() {
    let cloud = FakeCloud::new();
    let reconciler = ResourceReconciler::new(cloud.clone());

    let first = reconciler.ensure_compute_instance(&spec(), &key()).await.unwrap();
    let second = reconciler.ensure_compute_instance(&spec(), &key()).await.unwrap();

    assert_eq!(first.action, Action::Created);
    assert_eq!(second.action, Action::Unchanged);
    assert_eq!(first.instance.id, second.instance.id);
    assert_eq!(cloud.with(|s| s.droplet_creates), 1);
}

#[tokio::test]
async fn created_instance_is_tagged_and_keyed() {
    let cloud = FakeCloud::new();

    let created = ResourceReconciler::new(cloud.clone())
        .ensure_compute_instance(&spec(), &key())
        .await
        .unwrap();

    assert_eq!(created.instance.name, "n8n-n8n");
    assert!(created.instance.tags.contains(&"n8n-deploy".to_string()));
    assert!(
        created
            .instance
            .tags
            .contains(&"n8n-deploy-key:n8n-deploy".to_string())
    );
}

#[tokio::test]
async fn other_deployments_are_ignored() {
    let cloud = FakeCloud::new();
    cloud.with(|s| {
        s.next_id = 10;
        s.droplets.push(droplet(1, "staging-n8n", Some("198.51.100.1"), 1));
    });

    let result = ResourceReconciler::new(cloud.clone())
        .ensure_compute_instance(&spec(), &key())
        .await
        .unwrap();

    assert_eq!(result.action, Action::Created);
    assert_eq!(cloud.with(|s| s.droplets.len()), 2);
}

#[tokio::test]
async fn duplicates_keep_newest() {
    let cloud = FakeCloud::new();
    cloud.with(|s| {
        s.droplets.push(droplet(1, "n8n-n8n", Some("198.51.100.1"), 100));
        s.droplets.push(droplet(2, "n8n-n8n", Some("198.51.100.2"), 300));
        s.droplets.push(droplet(3, "n8n-n8n", Some("198.51.100.3"), 200));
    });
    let reconciler = ResourceReconciler::new(cloud.clone());

    let result = reconciler.ensure_compute_instance(&spec(), &key()).await.unwrap();

    assert_eq!(result.instance.id, 2);
    let dups: Vec<u64> = result.duplicates.iter().map(|d| d.id).collect();
    assert_eq!(dups, vec![3, 1]);
    assert_eq!(cloud.with(|s| s.mutations()), 0);

    reconciler.prune(&result.duplicates).await.unwrap();
    assert_eq!(cloud.with(|s| s.droplets.len()), 1);
}

#[tokio::test]
async fn dns_record_created_once() {
    let cloud = FakeCloud::new();
    let reconciler = ResourceReconciler::new(cloud.clone());
    let instance = droplet(5, "n8n-n8n", Some("203.0.113.5"), 1);

    let first = reconciler.ensure_dns_record(&instance, &spec()).await.unwrap();
    let second = reconciler.ensure_dns_record(&instance, &spec()).await.unwrap();

    assert_eq!(first.action, Action::Created);
    assert_eq!(second.action, Action::Unchanged);
    assert_eq!(first.record.data, "203.0.113.5");
    assert_eq!(first.record.name, "n8n");
    assert_eq!(cloud.with(|s| s.dns_creates), 1);
    assert_eq!(cloud.with(|s| s.mutations()), 1);
}

#[tokio::test]
async fn changed_ip_updates_record() {
    let cloud = FakeCloud::new();
    cloud.with(|s| {
        s.records.push(("example.com".to_string(), a_record(9, "n8n", "198.51.100.9")));
        s.records.push(("example.com".to_string(), a_record(10, "www", "198.51.100.9")));
    });
    let instance = droplet(5, "n8n-n8n", Some("203.0.113.5"), 1);

    let result = ResourceReconciler::new(cloud.clone())
        .ensure_dns_record(&instance, &spec())
        .await
        .unwrap();

    assert_eq!(result.action, Action::Updated);
    assert_eq!(result.record.id, 9);
    assert_eq!(cloud.with(|s| s.dns_creates), 0);
    assert_eq!(cloud.with(|s| s.dns_updates), 1);
    assert_eq!(cloud.with(|s| s.records.len()), 2);
}

#[tokio::test]
async fn conflicting_records_removed() {
    let cloud = FakeCloud::new();
    cloud.with(|s| {
        s.records.push(("example.com".to_string(), a_record(1, "n8n", "198.51.100.1")));
        s.records.push(("example.com".to_string(), a_record(2, "n8n", "203.0.113.5")));
    });
    let instance = droplet(5, "n8n-n8n", Some("203.0.113.5"), 1);

    let result = ResourceReconciler::new(cloud.clone())
        .ensure_dns_record(&instance, &spec())
        .await
        .unwrap();

    assert_eq!(result.action, Action::Unchanged);
    assert_eq!(result.record.id, 2);
    assert_eq!(result.removed.len(), 1);
    assert_eq!(cloud.with(|s| s.records.len()), 1);
}

#[tokio::test]
async fn instance_without_address_fails() {
    let cloud = FakeCloud::new();
    let instance = droplet(5, "n8n-n8n", None, 1);

    let err = ResourceReconciler::new(cloud.clone())
        .ensure_dns_record(&instance, &spec())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no public IPv4"));
    assert_eq!(cloud.with(|s| s.mutations()), 0);
}

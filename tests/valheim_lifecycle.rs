use std::time::Duration;

use gamely_operator::credential::{self, Bootstrap, PASSWORD_KEY};
use gamely_operator::prelude::*;
use gamely_operator::status::{READY, REASON_RECONCILE_FAILED};
use gamely_operator::store::Write;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

const NS: &str = "games";

fn valheim(name: &str) -> Valheim {
    let mut server = Valheim::new(
        name,
        ValheimSpec {
            storage: StorageSpec {
                size: "1Gi".into(),
                class: None,
            },
            ..Default::default()
        },
    );
    server.metadata.namespace = Some(NS.into());
    server
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NS, name)
}

fn stored(store: &MemoryStore, name: &str) -> Valheim {
    store.get_now::<Valheim>(NS, name).unwrap()
}

/// Runs the bootstrap pass and the convergence pass.
async fn converge(store: &MemoryStore, name: &str) {
    let scope = Scope::new(store);
    assert_eq!(
        scope.reconcile::<Valheim>(&key(name)).await.unwrap(),
        Outcome::RequeueNow
    );
    assert_eq!(
        scope.reconcile::<Valheim>(&key(name)).await.unwrap(),
        Outcome::Done
    );
}

fn writes_of(writes: &[Write], kind: &str) -> usize {
    writes.iter().filter(|w| w.kind == kind).count()
}

#[tokio::test]
async fn new_server_converges_in_two_passes() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    let scope = Scope::new(&store);

    let outcome = scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    assert_eq!(outcome, Outcome::RequeueNow);

    let secret = store.get_now::<Secret>(NS, "v1").expect("password secret");
    assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    let password = &secret.data.as_ref().unwrap()[PASSWORD_KEY].0;
    assert_eq!(password.len(), 6);
    assert!(password.iter().all(u8::is_ascii_alphanumeric));
    let owner = &secret.metadata.owner_references.as_ref().unwrap()[0];
    assert_eq!(owner.kind, "Valheim");
    assert_eq!(owner.controller, Some(true));

    let server = stored(&store, "v1");
    let reference = server.spec.server.password.as_ref().expect("reference");
    assert_eq!(reference.name, "v1");
    assert_eq!(reference.namespace.as_deref(), Some(NS));
    assert!(
        !store.contains::<StatefulSet>(NS, "v1"),
        "no workload before the credential is recorded"
    );

    let outcome = scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    assert_eq!(outcome, Outcome::Done);

    assert!(store.contains::<ServiceAccount>(NS, "v1"));
    assert!(store.contains::<PersistentVolumeClaim>(NS, "v1"));
    assert!(store.contains::<Service>(NS, "v1"));
    let sts = store.get_now::<StatefulSet>(NS, "v1").expect("workload");
    let pod = sts.spec.unwrap().template.spec.unwrap();
    let env = pod.containers[0].env.clone().unwrap();
    let pass = env.iter().find(|e| e.name == "SERVER_PASS").unwrap();
    let secret_ref = pass
        .value_from
        .as_ref()
        .and_then(|v| v.secret_key_ref.as_ref())
        .unwrap();
    assert_eq!(secret_ref.name, "v1");
    assert_eq!(secret_ref.key, PASSWORD_KEY);

    let server = stored(&store, "v1");
    let status = server.status.as_ref().unwrap();
    assert!(status.ready);
    assert_eq!(Some(status.observed_generation), server.metadata.generation);
    assert_eq!(status.world_storage.as_deref(), Some("v1"));
    assert_eq!(
        status.condition(READY).map(|c| c.status),
        Some(ConditionStatus::True)
    );

    let events = store.events();
    assert!(events
        .iter()
        .any(|e| e.reason == "Converged" && e.type_ == EventType::Normal));
}

#[tokio::test]
async fn converged_server_is_left_alone() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;
    store.clear_writes();

    let scope = Scope::new(&store);
    let outcome = scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.write_count(), 0);

    // A forced pass over unchanged children writes nothing either.
    let convergence = scope.converge(&stored(&store, "v1")).await.unwrap();
    assert_eq!(convergence.writes, 0);
    assert!(convergence.resize_needed.is_empty());
    assert_eq!(store.write_count(), 0, "writes: {:?}", store.writes());
}

#[tokio::test]
async fn existing_secret_is_adopted_not_regenerated() {
    let store = MemoryStore::new();
    let server = store.insert(&valheim("v1")).unwrap();

    let mut existing = Secret::default();
    existing.metadata.name = Some("v1".into());
    existing.metadata.namespace = Some(NS.into());
    existing.data = Some(
        [(
            PASSWORD_KEY.to_string(),
            k8s_openapi::ByteString(b"hunter".to_vec()),
        )]
        .into(),
    );
    store.insert(&existing).unwrap();

    let outcome = credential::bootstrap(&store, &server).await.unwrap();
    assert_eq!(outcome, Bootstrap::Adopted);
    assert_eq!(store.count::<Secret>(), 1);
    let secret = store.get_now::<Secret>(NS, "v1").unwrap();
    assert_eq!(secret.data.unwrap()[PASSWORD_KEY].0, b"hunter".to_vec());
    assert!(stored(&store, "v1").spec.server.password.is_some());
}

#[tokio::test]
async fn credential_reference_is_written_once() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;
    let secret = store.get_now::<Secret>(NS, "v1").unwrap();

    // Later spec edits go through convergence, never through bootstrap.
    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.server.public = true)
        .unwrap();
    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.count::<Secret>(), 1);
    assert_eq!(store.get_now::<Secret>(NS, "v1").unwrap().data, secret.data);
}

#[tokio::test]
async fn stale_bootstrap_conflicts_and_retry_adopts() {
    let store = MemoryStore::new();
    let stale = store.insert(&valheim("v1")).unwrap();
    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.server.name = "Midgard".into())
        .unwrap();

    let err = credential::bootstrap(&store, &stale).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)), "got {err:?}");
    assert!(err.is_transient());
    assert!(stored(&store, "v1").spec.server.password.is_none());

    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::RequeueNow);
    assert_eq!(store.count::<Secret>(), 1);
    let server = stored(&store, "v1");
    assert_eq!(server.spec.server.name, "Midgard");
    assert!(server.spec.server.password.is_some());
}

#[tokio::test]
async fn grown_storage_is_reported_not_applied() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;
    store.clear_writes();

    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.storage.size = "2Gi".into())
        .unwrap();
    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);

    let writes = store.writes();
    assert_eq!(writes_of(&writes, "PersistentVolumeClaim"), 0);
    let claim = store.get_now::<PersistentVolumeClaim>(NS, "v1").unwrap();
    let size = &claim.spec.unwrap().resources.unwrap().requests.unwrap()["storage"];
    assert_eq!(size.0, "1Gi");

    let resize = store
        .events()
        .into_iter()
        .find(|e| e.reason == "ResizeNeeded")
        .expect("resize event");
    assert_eq!(resize.type_, EventType::Warning);
    assert!(resize.message.contains("2Gi"));

    let server = stored(&store, "v1");
    assert_eq!(
        Some(server.status.unwrap().observed_generation),
        server.metadata.generation
    );
}

#[tokio::test]
async fn equal_quantities_are_not_a_resize() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;

    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.storage.size = "1024Mi".into())
        .unwrap();
    Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert!(store.events().iter().all(|e| e.reason != "ResizeNeeded"));
}

#[tokio::test]
async fn paused_server_is_requeued_without_writes() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.spec.paused = true;
    store.insert(&server).unwrap();

    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::RequeueAfter(Duration::from_secs(60)));

    let outcome = Scope::new(&store)
        .with_pause_requeue(Duration::from_secs(5))
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::RequeueAfter(Duration::from_secs(5)));

    assert_eq!(store.write_count(), 0);
    assert_eq!(store.count::<Secret>(), 0);
}

#[tokio::test]
async fn deleting_server_is_not_touched() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
    store.insert(&server).unwrap();

    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.write_count(), 0);
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn missing_server_is_done() {
    let store = MemoryStore::new();
    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("gone"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn failing_step_keeps_earlier_children() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    let scope = Scope::new(&store);
    scope.reconcile::<Valheim>(&key("v1")).await.unwrap();

    store.fail_next(Verb::Create, "StatefulSet");
    let err = scope.reconcile::<Valheim>(&key("v1")).await.unwrap_err();
    assert!(matches!(err, Error::Store(_)), "got {err:?}");

    assert!(store.contains::<ServiceAccount>(NS, "v1"));
    assert!(store.contains::<PersistentVolumeClaim>(NS, "v1"));
    assert!(!store.contains::<StatefulSet>(NS, "v1"));
    assert!(!store.contains::<Service>(NS, "v1"));

    let server = stored(&store, "v1");
    let status = server.status.as_ref().unwrap();
    assert!(!status.ready);
    assert_eq!(status.observed_generation, 0);
    let ready = status.condition(READY).unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason.as_deref(), Some(REASON_RECONCILE_FAILED));
    assert!(store
        .events()
        .iter()
        .any(|e| e.reason == REASON_RECONCILE_FAILED && e.type_ == EventType::Warning));

    // The retry picks up where the failed pass stopped.
    let outcome = scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert!(store.contains::<StatefulSet>(NS, "v1"));
    assert!(stored(&store, "v1").status.unwrap().ready);
}

#[tokio::test]
async fn observed_generation_only_moves_forward() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;
    let converged = stored(&store, "v1").status.unwrap().observed_generation;

    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.server.public = true)
        .unwrap();
    store.fail_next(Verb::Update, "StatefulSet");
    let scope = Scope::new(&store);
    assert!(scope.reconcile::<Valheim>(&key("v1")).await.is_err());

    let server = stored(&store, "v1");
    let status = server.status.as_ref().unwrap();
    assert_eq!(status.observed_generation, converged);
    assert!(status.observed_generation < server.metadata.generation.unwrap());

    scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    let server = stored(&store, "v1");
    let status = server.status.as_ref().unwrap();
    assert_eq!(Some(status.observed_generation), server.metadata.generation);
    assert!(status.observed_generation > converged);
}

#[tokio::test]
async fn drifted_workload_is_replaced() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;

    store
        .edit::<StatefulSet>(NS, "v1", |sts| {
            if let Some(spec) = sts.spec.as_mut() {
                spec.replicas = Some(3);
            }
        })
        .unwrap();
    store.clear_writes();

    let convergence = Scope::new(&store)
        .converge(&stored(&store, "v1"))
        .await
        .unwrap();
    assert_eq!(convergence.writes, 1);
    assert_eq!(writes_of(&store.writes(), "StatefulSet"), 1);
    let sts = store.get_now::<StatefulSet>(NS, "v1").unwrap();
    assert_eq!(sts.spec.unwrap().replicas, Some(1));
}

fn server_container(store: &MemoryStore, name: &str) -> Container {
    let sts = store.get_now::<StatefulSet>(NS, name).unwrap();
    sts.spec.unwrap().template.spec.unwrap().containers[0].clone()
}

#[tokio::test]
async fn removed_spec_fields_are_cleared_from_workload() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.spec.image.version = "0.147.3".into();
    server.spec.image.pull_policy = Some("Always".into());
    server.spec.server.resources.limits = [("memory".to_string(), "4Gi".to_string())].into();
    store.insert(&server).unwrap();
    converge(&store, "v1").await;

    let container = server_container(&store, "v1");
    assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
    let limits = container.resources.unwrap().limits.unwrap();
    assert_eq!(limits["memory"].0, "4Gi");

    store
        .edit::<Valheim>(NS, "v1", |v| {
            v.spec.image.pull_policy = None;
            v.spec.server.resources.limits.clear();
        })
        .unwrap();
    store.clear_writes();

    let outcome = Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(writes_of(&store.writes(), "StatefulSet"), 1);

    let container = server_container(&store, "v1");
    assert_eq!(container.resources, None);
    assert_eq!(container.image_pull_policy.as_deref(), Some("IfNotPresent"));
    let server = stored(&store, "v1");
    assert_eq!(
        Some(server.status.unwrap().observed_generation),
        server.metadata.generation
    );

    store.clear_writes();
    let convergence = Scope::new(&store)
        .converge(&stored(&store, "v1"))
        .await
        .unwrap();
    assert_eq!(convergence.writes, 0);
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn removed_limit_is_dropped_while_others_stay() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.spec.server.resources.limits = [
        ("cpu".to_string(), "2".to_string()),
        ("memory".to_string(), "4Gi".to_string()),
    ]
    .into();
    store.insert(&server).unwrap();
    converge(&store, "v1").await;

    store
        .edit::<Valheim>(NS, "v1", |v| {
            v.spec.server.resources.limits.remove("cpu");
        })
        .unwrap();
    Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();

    let limits = server_container(&store, "v1").resources.unwrap().limits.unwrap();
    assert_eq!(limits.keys().collect::<Vec<_>>(), vec!["memory"]);
}

#[tokio::test]
async fn spec_change_updates_workload_env() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    converge(&store, "v1").await;

    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.server.public = true)
        .unwrap();
    Scope::new(&store)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap();

    let sts = store.get_now::<StatefulSet>(NS, "v1").unwrap();
    let env = sts.spec.unwrap().template.spec.unwrap().containers[0]
        .env
        .clone()
        .unwrap();
    let public = env.iter().find(|e| e.name == "SERVER_PUBLIC").unwrap();
    assert_eq!(public.value.as_deref(), Some("true"));
}

#[tokio::test]
async fn backup_claim_is_mounted_when_sized() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.spec.backups.storage.size = "5Gi".into();
    store.insert(&server).unwrap();
    converge(&store, "v1").await;

    assert!(store.contains::<PersistentVolumeClaim>(NS, "v1-backups"));
    let sts = store.get_now::<StatefulSet>(NS, "v1").unwrap();
    let pod = sts.spec.unwrap().template.spec.unwrap();
    assert_eq!(pod.volumes.unwrap().len(), 2);
    let env = pod.containers[0].env.clone().unwrap();
    assert!(env
        .iter()
        .any(|e| e.name == "BACKUPS_DIRECTORY" && e.value.as_deref() == Some("/config/backups")));
}

#[tokio::test]
async fn server_without_uid_cannot_own_children() {
    let store = MemoryStore::new();
    let mut server = valheim("v1");
    server.spec.server.password = Some(SecretReference {
        name: "v1".into(),
        namespace: Some(NS.into()),
    });

    let err = Scope::new(&store).converge(&server).await.unwrap_err();
    assert!(matches!(err, Error::OwnerReference(_)), "got {err:?}");
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn malformed_size_fails_before_any_write() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    let scope = Scope::new(&store);
    scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    store
        .edit::<Valheim>(NS, "v1", |v| v.spec.storage.size = "huge".into())
        .unwrap();
    store.clear_writes();

    let err = scope.reconcile::<Valheim>(&key("v1")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidQuantity { .. }), "got {err:?}");
    assert_eq!(store.count::<ServiceAccount>(), 0);
    // Only the failure status is written.
    assert!(store.writes().iter().all(|w| w.verb == Verb::UpdateStatus));
}

#[tokio::test]
async fn cancelled_pass_stops_without_failure_status() {
    let store = MemoryStore::new();
    store.insert(&valheim("v1")).unwrap();
    let scope = Scope::new(&store);
    scope.reconcile::<Valheim>(&key("v1")).await.unwrap();
    store.clear_writes();

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();
    let err = Scope::new(&store)
        .with_cancellation(token)
        .reconcile::<Valheim>(&key("v1"))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(store.write_count(), 0);
    assert!(stored(&store, "v1").status.is_none());
}

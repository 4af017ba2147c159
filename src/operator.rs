use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount};
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::config::{Kind, OperatorConfig};
use crate::crd::{GameServer, Minecraft, Valheim};
use crate::error::{Error, Result};
use crate::scope::{ObjectKey, Outcome, Scope, DEFAULT_PAUSE_REQUEUE};
use crate::store::KubeStore;

/// Runs one controller per game kind.
pub struct Operator<K: GameServer> {
    pause_requeue: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
    cancel: CancellationToken,
    _marker: PhantomData<K>,
}

impl<K: GameServer> Default for Operator<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: GameServer> Operator<K> {
    pub fn new() -> Self {
        Self {
            pause_requeue: DEFAULT_PAUSE_REQUEUE,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
            cancel: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    pub fn from_config(cfg: &OperatorConfig) -> Self {
        Self::new()
            .pause_requeue(cfg.pause_requeue())
            .backoff(cfg.backoff_base(), cfg.backoff_max())
    }

    pub fn pause_requeue(mut self, duration: Duration) -> Self {
        self.pause_requeue = duration;
        self
    }

    pub fn backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Cancelling `token` stops the watch streams and aborts in-flight
    /// convergence passes at the next step boundary.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn run(self, store: Arc<KubeStore>) -> Result<()> {
        let client = store.client().clone();
        info!("Starting controller for {}/{}", K::group(&()), K::kind(&()));

        let ctx = Arc::new(ControllerContext {
            store,
            backoff: Backoff::new(self.backoff_base, self.backoff_max),
            pause_requeue: self.pause_requeue,
            cancel: self.cancel.clone(),
        });

        Controller::new(Api::<K>::all(client.clone()), WatcherConfig::default())
            .owns(Api::<ServiceAccount>::all(client.clone()), WatcherConfig::default())
            .owns(
                Api::<PersistentVolumeClaim>::all(client.clone()),
                WatcherConfig::default(),
            )
            .owns(Api::<StatefulSet>::all(client.clone()), WatcherConfig::default())
            .owns(Api::<Service>::all(client.clone()), WatcherConfig::default())
            .owns(Api::<Secret>::all(client), WatcherConfig::default())
            .graceful_shutdown_on(self.cancel.cancelled_owned())
            .run(reconcile::<K>, error_policy::<K>, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((object, action)) => debug!(object = %object, ?action, "Reconciled"),
                    Err(e) => warn!(error = %e, "Reconcile loop error"),
                }
            })
            .await;

        info!("Controller for {} stopped", K::kind(&()));
        Ok(())
    }
}

/// Runs the controller for `K` with settings from `cfg`.
pub async fn run_controller<K: GameServer>(
    store: Arc<KubeStore>,
    cfg: &OperatorConfig,
    cancel: CancellationToken,
) -> Result<()> {
    Operator::<K>::from_config(cfg)
        .with_cancellation(cancel)
        .run(store)
        .await
}

/// Runs every controller enabled in `cfg` until `cancel` fires.
pub async fn run_all(client: Client, cfg: OperatorConfig, cancel: CancellationToken) -> Result<()> {
    cfg.validate()?;
    let store = Arc::new(KubeStore::new(client, cfg.field_manager.clone()));

    let runs: Vec<BoxFuture<'_, Result<()>>> = cfg
        .enabled_kinds()?
        .into_iter()
        .map(|kind| match kind {
            Kind::Valheim => run_controller::<Valheim>(store.clone(), &cfg, cancel.clone()).boxed(),
            Kind::Minecraft => {
                run_controller::<Minecraft>(store.clone(), &cfg, cancel.clone()).boxed()
            }
        })
        .collect();

    future::try_join_all(runs).await?;
    Ok(())
}

struct ControllerContext {
    store: Arc<KubeStore>,
    backoff: Backoff,
    pause_requeue: Duration,
    cancel: CancellationToken,
}

fn backoff_key<K: GameServer>(server: &K) -> String {
    format!("{}/{}", server.namespace().unwrap_or_default(), server.name_any())
}

async fn reconcile<K: GameServer>(server: Arc<K>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let key = ObjectKey::of(server.as_ref())?;

    let outcome = Scope::new(ctx.store.as_ref())
        .with_cancellation(ctx.cancel.child_token())
        .with_pause_requeue(ctx.pause_requeue)
        .reconcile::<K>(&key)
        .await?;
    ctx.backoff.reset(&key.to_string());

    Ok(match outcome {
        Outcome::Done => Action::await_change(),
        Outcome::RequeueNow => Action::requeue(Duration::ZERO),
        Outcome::RequeueAfter(after) => Action::requeue(after),
    })
}

fn error_policy<K: GameServer>(server: Arc<K>, err: &Error, ctx: Arc<ControllerContext>) -> Action {
    if err.is_cancelled() {
        return Action::await_change();
    }

    let key = backoff_key(server.as_ref());
    let delay = ctx.backoff.next_delay(&key, err.is_transient());
    if err.is_transient() {
        info!(%key, error = %err, ?delay, "Transient failure, retrying");
    } else {
        error!(
            %key,
            error = %err,
            failures = ctx.backoff.failures(&key),
            ?delay,
            "Reconcile failed"
        );
    }
    Action::requeue(delay)
}

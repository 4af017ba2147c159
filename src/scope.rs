//! Per-invocation state machine for a single game server.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::builder;
use crate::credential;
use crate::crd::GameServer;
use crate::error::{Error, Result};
use crate::reconciler::{ChildReconciler, ResizeNeeded};
use crate::store::{Event, ObjectStore};

pub const DEFAULT_PAUSE_REQUEUE: Duration = Duration::from_secs(60);

/// Namespaced name of the resource an invocation works on.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: GameServer>(server: &K) -> Result<Self> {
        let namespace = server
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        Ok(Self::new(namespace, server.name_any()))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Deleting,
    Paused,
    AwaitingCredential,
    Converging,
    Converged,
}

impl Phase {
    /// First match wins: deletion, pause, missing credential, unobserved
    /// generation.
    pub fn of<K: GameServer>(server: &K) -> Self {
        if server.meta().deletion_timestamp.is_some() {
            Phase::Deleting
        } else if server.paused() {
            Phase::Paused
        } else if server.credential().is_none() {
            Phase::AwaitingCredential
        } else if server.meta().generation.unwrap_or(0) > server.observed_generation() {
            Phase::Converging
        } else {
            Phase::Converged
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Done,
    RequeueNow,
    RequeueAfter(Duration),
}

/// What a successful convergence pass produced.
#[derive(Clone, Debug, Default)]
pub struct Convergence {
    pub world_claim: String,
    pub resize_needed: Vec<ResizeNeeded>,
    pub writes: usize,
}

pub struct Scope<'a, S> {
    store: &'a S,
    cancel: CancellationToken,
    pause_requeue: Duration,
}

impl<'a, S: ObjectStore> Scope<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            cancel: CancellationToken::new(),
            pause_requeue: DEFAULT_PAUSE_REQUEUE,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_pause_requeue(mut self, after: Duration) -> Self {
        self.pause_requeue = after;
        self
    }

    #[instrument(skip_all, fields(game = K::GAME, key = %key))]
    pub async fn reconcile<K: GameServer>(&self, key: &ObjectKey) -> Result<Outcome> {
        let Some(server) = self.store.get::<K>(&key.namespace, &key.name).await? else {
            debug!("Resource is gone, nothing to do");
            return Ok(Outcome::Done);
        };

        let phase = Phase::of(&server);
        debug!(?phase, generation = ?server.meta().generation, "Selected phase");

        match phase {
            Phase::Deleting => {
                info!("Resource is being deleted, owned children follow by cascade");
                Ok(Outcome::Done)
            }
            Phase::Paused => Ok(Outcome::RequeueAfter(self.pause_requeue)),
            Phase::AwaitingCredential => {
                self.step("credential", credential::bootstrap(self.store, &server))
                    .await?;
                Ok(Outcome::RequeueNow)
            }
            Phase::Converging => match self.converge(&server).await {
                Ok(convergence) => {
                    self.publish_ready(&server, &convergence).await?;
                    Ok(Outcome::Done)
                }
                Err(err) => {
                    self.publish_failure(&server, &err).await;
                    Err(err)
                }
            },
            Phase::Converged => Ok(Outcome::Done),
        }
    }

    /// Runs every ensure-step in order and stops at the first error. Children
    /// created before the failure are left in place.
    pub async fn converge<K: GameServer>(&self, server: &K) -> Result<Convergence> {
        let children = ChildReconciler::new(self.store, server)?;
        let desired = builder::desired_state(server)?;
        let mut convergence = Convergence::default();

        let account = self
            .step("service account", children.ensure_exists(desired.service_account))
            .await?;
        convergence.writes += usize::from(account.wrote());

        for claim in &desired.claims {
            let ensured = self.step("storage claim", children.ensure_claim(claim)).await?;
            convergence.writes += usize::from(ensured.created);
            convergence.resize_needed.extend(ensured.resize);
            if convergence.world_claim.is_empty() {
                convergence.world_claim = ensured.bound.claim_name;
            }
        }

        let applied = self
            .step("workload", children.ensure_matches(desired.workload))
            .await?;
        convergence.writes += usize::from(applied.wrote());

        let applied = self
            .step("service", children.ensure_matches(desired.service))
            .await?;
        convergence.writes += usize::from(applied.wrote());

        for resize in &convergence.resize_needed {
            self.emit(
                server,
                Event::warning(
                    "ResizeNeeded",
                    format!(
                        "claim {} requests {}, spec asks for {}",
                        resize.claim, resize.current, resize.requested
                    ),
                ),
            )
            .await;
        }

        Ok(convergence)
    }

    async fn publish_ready<K: GameServer>(&self, server: &K, convergence: &Convergence) -> Result<()> {
        let generation = server.meta().generation.unwrap_or(0);
        let mut updated = server.clone();
        let status = updated.status_mut();
        status.mark_converged(generation);
        if !convergence.world_claim.is_empty() {
            status.world_storage = Some(convergence.world_claim.clone());
        }

        self.step("status", self.store.update_status(&updated)).await?;
        info!(generation, writes = convergence.writes, "Converged");
        self.emit(
            server,
            Event::normal("Converged", format!("generation {generation} converged")),
        )
        .await;
        Ok(())
    }

    /// Best effort: failures here are logged, never raised.
    async fn publish_failure<K: GameServer>(&self, server: &K, err: &Error) {
        if err.is_cancelled() {
            return;
        }
        warn!(error = %err, "Convergence failed");

        let mut updated = server.clone();
        updated
            .status_mut()
            .mark_failed(server.meta().generation.unwrap_or(0), err.to_string());
        if let Err(status_err) = self.store.update_status(&updated).await {
            warn!(error = %status_err, "Could not record failure in status");
        }
        self.emit(server, Event::warning("ReconcileFailed", err.to_string()))
            .await;
    }

    async fn emit<K: GameServer>(&self, server: &K, event: Event) {
        if let Err(err) = self.store.record_event(server, event).await {
            warn!(error = %err, "Could not record event");
        }
    }

    /// Runs `fut` unless the invocation is cancelled first.
    async fn step<T>(&self, name: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(name));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled(name)),
            result = fut => result,
        }
    }
}

//! Typed access to the orchestration API.
//!
//! Reconcile logic talks to an [`ObjectStore`] rather than a client so the
//! same code runs against the cluster and against [`MemoryStore`].

mod cluster;
mod memory;

pub use cluster::KubeStore;
pub use memory::{MemoryStore, RecordedEvent, Verb, Write};

use std::fmt::Debug;

use async_trait::async_trait;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// A namespaced API object the store can read and write.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> Object for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub type_: EventType,
    pub reason: String,
    pub message: String,
}

impl Event {
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Object store with optimistic concurrency.
///
/// `update` and `update_status` carry the `resourceVersion` of the object they
/// were given. A stale version fails with [`crate::Error::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Not-found is `Ok(None)`.
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: Object>(&self, obj: &K) -> Result<K>;

    /// Full replace of everything except status.
    async fn update<K: Object>(&self, obj: &K) -> Result<K>;

    /// Writes only the status subresource.
    async fn update_status<K: Object>(&self, obj: &K) -> Result<K>;

    async fn record_event<K: Object>(&self, obj: &K, event: Event) -> Result<()>;
}

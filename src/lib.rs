pub mod backoff;
pub mod builder;
pub mod config;
pub mod crd;
pub mod credential;
pub mod error;
pub mod operator;
pub mod quantity;
pub mod reconciler;
pub mod scope;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod types;

pub use config::OperatorConfig;
pub use crd::{GameServer, Minecraft, Valheim};
pub use error::{Error, Result};
pub use operator::{run_all, run_controller, Operator};
pub use scope::{ObjectKey, Outcome, Phase, Scope};
pub use store::{KubeStore, MemoryStore, ObjectStore};
pub use telemetry::init_tracing;

pub mod prelude {
    pub use crate::crd::{
        GameServer, Minecraft, MinecraftSpec, SecretReference, StorageSpec, Valheim, ValheimSpec,
    };
    pub use crate::error::{Error, Result};
    pub use crate::scope::{ObjectKey, Outcome, Phase, Scope};
    pub use crate::status::{Condition, ConditionStatus, GameServerStatus};
    pub use crate::store::{Event, EventType, MemoryStore, ObjectStore, Verb};

    pub use kube::CustomResourceExt;
    pub use kube::ResourceExt;

    pub use std::time::Duration;
}

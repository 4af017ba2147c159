//! Desired state for a game server's children.
//!
//! Everything here is a pure function of the resource. The scope controller
//! decides which pieces to write and feeds claim names back in through
//! [`BoundClaim`].

pub mod env;
pub mod minecraft;
pub mod valheim;

pub use env::EnvList;

use kube::ResourceExt;

use crate::crd::{GameServer, StorageSpec};
use crate::error::{Error, Result};
use crate::quantity;
use crate::types::{Labels, PersistentVolumeClaim, Service, ServiceAccount, StatefulSet, Volume};

/// A storage claim the workload needs, before it exists.
#[derive(Clone, Debug)]
pub struct ClaimSpec {
    pub volume: &'static str,
    pub mount_path: &'static str,
    pub claim: PersistentVolumeClaim,
}

impl ClaimSpec {
    /// Rejects a size that does not parse as a positive quantity.
    pub fn new(
        volume: &'static str,
        mount_path: &'static str,
        claim_name: impl Into<String>,
        storage: &StorageSpec,
        labels: &Labels,
    ) -> Result<Self> {
        if storage.size.trim().is_empty() {
            return Err(Error::MissingField("storage.size"));
        }
        if !quantity::parse(&storage.size)?.is_positive() {
            return Err(Error::InvalidQuantity {
                value: storage.size.clone(),
                reason: "must be positive",
            });
        }

        Ok(Self {
            volume,
            mount_path,
            claim: PersistentVolumeClaim::new(claim_name, storage.size.trim())
                .labels(labels.clone())
                .storage_class(storage.class.clone()),
        })
    }

    pub fn name(&self) -> &str {
        &self.claim.name
    }

    pub fn size(&self) -> &str {
        &self.claim.storage
    }

    pub fn bind(&self, claim_name: impl Into<String>) -> BoundClaim {
        BoundClaim {
            volume: self.volume.to_string(),
            mount_path: self.mount_path.to_string(),
            claim_name: claim_name.into(),
        }
    }
}

/// A claim that exists, with the name the workload should mount.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundClaim {
    pub volume: String,
    pub mount_path: String,
    pub claim_name: String,
}

impl BoundClaim {
    pub fn volume(&self) -> Volume {
        Volume::pvc(&self.volume, &self.claim_name)
    }
}

#[derive(Clone, Debug)]
pub struct DesiredState {
    pub labels: Labels,
    pub service_account: ServiceAccount,
    pub claims: Vec<ClaimSpec>,
    pub workload: StatefulSet,
    pub service: Service,
}

pub fn service_account<K: GameServer>(server: &K, labels: &Labels) -> ServiceAccount {
    ServiceAccount::new(server.name_any()).labels(labels.clone())
}

/// Renders every child with each claim bound under its own name. Nothing is
/// rendered when any piece is invalid, so the controller fails a pass before
/// its first write.
pub fn desired_state<K: GameServer>(server: &K) -> Result<DesiredState> {
    let labels = server.child_labels();
    let claims = server.claims()?;
    let bound: Vec<BoundClaim> = claims.iter().map(|c| c.bind(c.name())).collect();

    Ok(DesiredState {
        service_account: service_account(server, &labels),
        workload: server.workload(&labels, &bound)?,
        service: server.service(&labels),
        claims,
        labels,
    })
}

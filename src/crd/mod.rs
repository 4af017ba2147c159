//! Custom resources served under `server.gamely.io/v1alpha1`.

pub mod minecraft;
pub mod valheim;

pub use minecraft::{
    FabricSpec, ForgeSpec, Minecraft, MinecraftHooks, MinecraftSettings, MinecraftSpec, PaperSpec,
    PlatformSpec, QuiltSpec,
};
pub use valheim::{
    AccessSpec, BackupSpec, Valheim, ValheimHooks, ValheimServerSpec, ValheimSpec,
    WorldModifiers,
};

use std::collections::BTreeMap;
use std::fmt::Debug;

use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::builder::{BoundClaim, ClaimSpec};
use crate::error::Result;
use crate::status::GameServerStatus;
use crate::types::{Labels, Service, StatefulSet};

pub const GROUP: &str = "server.gamely.io";
pub const GAME_LABEL: &str = "gamely.io";
pub const SERVER_LABEL: &str = "server";

/// Container image coordinates. Empty fields fall back to per-game defaults.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

impl ImageSpec {
    pub fn reference(&self, default_repository: &str) -> String {
        let repository = if self.repository.is_empty() {
            default_repository
        } else {
            &self.repository
        };
        format!("{repository}:{}", self.tag())
    }

    /// The pull policy to render. Without an explicit one this is the policy
    /// the API server would default to, so a removed `pullPolicy` is written
    /// back instead of lingering on the workload.
    pub fn pull_policy(&self) -> String {
        match &self.pull_policy {
            Some(policy) if !policy.is_empty() => policy.clone(),
            _ if self.tag() == "latest" => "Always".to_string(),
            _ => "IfNotPresent".to_string(),
        }
    }

    fn tag(&self) -> &str {
        if self.version.is_empty() {
            "latest"
        } else {
            &self.version
        }
    }
}

/// Compute resources, passed to the container verbatim.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct StorageSpec {
    #[serde(default)]
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ServiceSpec {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
}

impl ServiceSpec {
    pub fn service_type(&self) -> &'static str {
        match self.type_.as_str() {
            "LoadBalancer" => "LoadBalancer",
            "NodePort" => "NodePort",
            _ => "ClusterIP",
        }
    }
}

/// Points at a Secret by name. The value itself never appears in a spec.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct SecretReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A game server custom resource the scope controller knows how to converge.
///
/// Implementors describe their children; the controller decides when and how
/// they are written.
pub trait GameServer:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Value of the `gamely.io` label on every child.
    const GAME: &'static str;

    fn paused(&self) -> bool;

    fn credential(&self) -> Option<&SecretReference>;

    fn set_credential(&mut self, reference: SecretReference);

    fn status(&self) -> Option<&GameServerStatus>;

    fn status_mut(&mut self) -> &mut GameServerStatus;

    /// Storage claims in mount order. The first one holds the world.
    fn claims(&self) -> Result<Vec<ClaimSpec>>;

    fn workload(&self, labels: &Labels, claims: &[BoundClaim]) -> Result<StatefulSet>;

    fn service(&self, labels: &Labels) -> Service;

    /// Labels stamped on every child and used as the pod selector.
    fn child_labels(&self) -> Labels {
        Labels::new()
            .insert(GAME_LABEL, Self::GAME)
            .insert(SERVER_LABEL, self.name_any())
    }

    fn observed_generation(&self) -> i64 {
        self.status().map(|s| s.observed_generation).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_policy_follows_the_tag_unless_set() {
        let mut image = ImageSpec::default();
        assert_eq!(image.reference("itzg/minecraft-server"), "itzg/minecraft-server:latest");
        assert_eq!(image.pull_policy(), "Always");

        image.version = "2024.6.1".into();
        assert_eq!(image.pull_policy(), "IfNotPresent");

        image.pull_policy = Some("Never".into());
        assert_eq!(image.pull_policy(), "Never");
    }
}

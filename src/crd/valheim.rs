use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GameServer, ImageSpec, ResourceSpec, SecretReference, ServiceSpec, StorageSpec};
use crate::builder::{self, BoundClaim, ClaimSpec};
use crate::error::Result;
use crate::status::GameServerStatus;
use crate::types::{Labels, Service, StatefulSet};

pub const DEFAULT_REPOSITORY: &str = "ghcr.io/lloesche/valheim-server";
pub const DEFAULT_SERVER_NAME: &str = "Hosted by Gamely";
pub const DEFAULT_WORLD_NAME: &str = "Dedicated";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "server.gamely.io",
    version = "v1alpha1",
    kind = "Valheim",
    plural = "valheims",
    namespaced,
    status = "GameServerStatus",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ValheimSpec {
    #[serde(default)]
    pub image: ImageSpec,
    #[serde(default)]
    pub server: ValheimServerSpec,
    #[serde(default)]
    pub service: ServiceSpec,
    #[serde(default)]
    pub world_modifiers: WorldModifiers,
    #[serde(default)]
    pub access: AccessSpec,
    #[serde(default)]
    pub backups: BackupSpec,
    #[serde(default)]
    pub hooks: ValheimHooks,
    #[serde(default)]
    pub paused: bool,
    pub storage: StorageSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValheimServerSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Set by the operator once the generated password Secret exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub world_name_or_seed: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_env: BTreeMap<String, String>,
}

/// World modifiers passed to the dedicated server as `-modifier` arguments.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorldModifiers {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub combat: String,
    #[serde(default, alias = "cdeathPenalty", skip_serializing_if = "String::is_empty")]
    pub death_penalty: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub raids: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_rate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub portals: String,
    /// A world key such as `nobuildcost`, passed with `-setkey`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hammer_mode: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AccessSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub admins: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banned: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permitted: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default)]
    pub storage: StorageSpec,
}

impl BackupSpec {
    pub fn has_claim(&self) -> bool {
        !self.storage.size.trim().is_empty()
    }
}

/// Shell commands run by the server image at the matching lifecycle point.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValheimHooks {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_supervisor: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_bootstrap: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_bootstrap: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_backup: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_backup: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_update_check: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_update_check: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_start: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_start: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_restart: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_restart: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_server_listening: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_server_listening: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_server_run: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_server_run: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_server_shutdown: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_server_shutdown: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pre_bepinex_config: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub post_bepinex_config: String,
}

impl ValheimHooks {
    /// Hooks paired with their environment keys, in emission order.
    pub fn entries(&self) -> [(&'static str, &str); 19] {
        [
            ("PRE_SUPERVISOR_HOOK", &self.pre_supervisor),
            ("PRE_BOOTSTRAP_HOOK", &self.pre_bootstrap),
            ("POST_BOOTSTRAP_HOOK", &self.post_bootstrap),
            ("PRE_BACKUP_HOOK", &self.pre_backup),
            ("POST_BACKUP_HOOK", &self.post_backup),
            ("PRE_UPDATE_CHECK_HOOK", &self.pre_update_check),
            ("POST_UPDATE_CHECK_HOOK", &self.post_update_check),
            ("PRE_START_HOOK", &self.pre_start),
            ("POST_START_HOOK", &self.post_start),
            ("PRE_RESTART_HOOK", &self.pre_restart),
            ("POST_RESTART_HOOK", &self.post_restart),
            ("PRE_SERVER_LISTENING_HOOK", &self.pre_server_listening),
            ("POST_SERVER_LISTENING_HOOK", &self.post_server_listening),
            ("PRE_SERVER_RUN_HOOK", &self.pre_server_run),
            ("POST_SERVER_RUN_HOOK", &self.post_server_run),
            ("PRE_SERVER_SHUTDOWN_HOOK", &self.pre_server_shutdown),
            ("POST_SERVER_SHUTDOWN_HOOK", &self.post_server_shutdown),
            ("PRE_BEPINEX_CONFIG_HOOK", &self.pre_bepinex_config),
            ("POST_BEPINEX_CONFIG_HOOK", &self.post_bepinex_config),
        ]
    }
}

impl Valheim {
    pub fn server_name(&self) -> &str {
        match self.spec.server.name.as_str() {
            "" => DEFAULT_SERVER_NAME,
            name => name,
        }
    }

    pub fn world_name(&self) -> &str {
        match self.spec.server.world_name_or_seed.as_str() {
            "" => DEFAULT_WORLD_NAME,
            world => world,
        }
    }

    pub fn image(&self) -> String {
        self.spec.image.reference(DEFAULT_REPOSITORY)
    }
}

impl GameServer for Valheim {
    const GAME: &'static str = "valheim";

    fn paused(&self) -> bool {
        self.spec.paused
    }

    fn credential(&self) -> Option<&SecretReference> {
        self.spec.server.password.as_ref()
    }

    fn set_credential(&mut self, reference: SecretReference) {
        self.spec.server.password = Some(reference);
    }

    fn status(&self) -> Option<&GameServerStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut GameServerStatus {
        self.status.get_or_insert_with(GameServerStatus::default)
    }

    fn claims(&self) -> Result<Vec<ClaimSpec>> {
        builder::valheim::claims(self)
    }

    fn workload(&self, labels: &Labels, claims: &[BoundClaim]) -> Result<StatefulSet> {
        builder::valheim::workload(self, labels, claims)
    }

    fn service(&self, labels: &Labels) -> Service {
        builder::valheim::service(self, labels)
    }
}

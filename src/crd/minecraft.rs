use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{GameServer, ImageSpec, ResourceSpec, SecretReference, ServiceSpec, StorageSpec};
use crate::builder::{self, BoundClaim, ClaimSpec};
use crate::error::Result;
use crate::status::GameServerStatus;
use crate::types::{Labels, Service, StatefulSet};

pub const DEFAULT_REPOSITORY: &str = "itzg/minecraft-server";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "server.gamely.io",
    version = "v1alpha1",
    kind = "Minecraft",
    plural = "minecrafts",
    namespaced,
    status = "GameServerStatus",
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Paused","type":"boolean","jsonPath":".spec.paused"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftSpec {
    #[serde(default)]
    pub image: ImageSpec,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default)]
    pub hooks: MinecraftHooks,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_args: Vec<String>,
    #[serde(default)]
    pub settings: MinecraftSettings,
    #[serde(default)]
    pub platform: PlatformSpec,
    #[serde(default)]
    pub service: ServiceSpec,
    /// Set by the operator once the generated RCON password Secret exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rcon_password: Option<SecretReference>,
    #[serde(default)]
    pub paused: bool,
    pub storage: StorageSpec,
}

/// RCON command lists run on server events.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftHooks {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub start_up: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_connect: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_disconnect: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_first_connect: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_last_disconnect: String,
}

impl MinecraftHooks {
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("RCON_CMDS_STARTUP", &self.start_up),
            ("RCON_CMDS_ON_CONNECT", &self.on_connect),
            ("RCON_CMDS_ON_DISCONNECT", &self.on_disconnect),
            ("RCON_CMDS_FIRST_CONNECT", &self.on_first_connect),
            ("RCON_CMDS_LAST_DISCONNECT", &self.on_last_disconnect),
        ]
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MinecraftSettings {
    #[serde(default)]
    pub accept_eula: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timezone: String,
    #[serde(default)]
    pub rotate_logs: bool,
    #[serde(default)]
    pub use_aikar_flags: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub motd: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub difficulty: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_players: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_world_size: String,
    #[serde(default)]
    pub hardcore: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seed: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default)]
    pub pvp: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct PlatformSpec {
    /// One of `fabric`, `forge`, `paper` or `quilt`. Empty runs vanilla.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default)]
    pub fabric: FabricSpec,
    #[serde(default)]
    pub forge: ForgeSpec,
    #[serde(default)]
    pub paper: PaperSpec,
    #[serde(default)]
    pub quilt: QuiltSpec,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FabricSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub launcher_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loader_version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ForgeSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaperSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub download_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuiltSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loader_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub installer_version: String,
}

impl PlatformSpec {
    /// Version keys of the selected platform only.
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        match self.type_.to_ascii_lowercase().as_str() {
            "fabric" => vec![
                ("FABRIC_LAUNCHER_VERSION", &self.fabric.launcher_version),
                ("FABRIC_LOADER_VERSION", &self.fabric.loader_version),
            ],
            "forge" => vec![("FORGE_VERSION", &self.forge.version)],
            "paper" => vec![
                ("PAPER_DOWNLOAD_URL", &self.paper.download_url),
                ("PAPER_CHANNEL", &self.paper.variant),
            ],
            "quilt" => vec![
                ("QUILT_LOADER_VERSION", &self.quilt.loader_version),
                ("QUILT_INSTALLER_VERSION", &self.quilt.installer_version),
            ],
            _ => Vec::new(),
        }
    }
}

impl Minecraft {
    pub fn image(&self) -> String {
        self.spec.image.reference(DEFAULT_REPOSITORY)
    }
}

impl GameServer for Minecraft {
    const GAME: &'static str = "minecraft";

    fn paused(&self) -> bool {
        self.spec.paused
    }

    fn credential(&self) -> Option<&SecretReference> {
        self.spec.rcon_password.as_ref()
    }

    fn set_credential(&mut self, reference: SecretReference) {
        self.spec.rcon_password = Some(reference);
    }

    fn status(&self) -> Option<&GameServerStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut GameServerStatus {
        self.status.get_or_insert_with(GameServerStatus::default)
    }

    fn claims(&self) -> Result<Vec<ClaimSpec>> {
        builder::minecraft::claims(self)
    }

    fn workload(&self, labels: &Labels, claims: &[BoundClaim]) -> Result<StatefulSet> {
        builder::minecraft::workload(self, labels, claims)
    }

    fn service(&self, labels: &Labels) -> Service {
        builder::minecraft::service(self, labels)
    }
}

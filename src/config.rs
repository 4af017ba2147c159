use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::error::{Error, Result};

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    /// Default tracing directive, overridden by `RUST_LOG`.
    #[envconfig(from = "GAMELY_LOG", default = "info")]
    pub log: String,

    /// Comma separated list of kinds to run controllers for.
    #[envconfig(from = "GAMELY_CONTROLLERS", default = "valheim,minecraft")]
    pub controllers: String,

    #[envconfig(from = "GAMELY_PAUSE_REQUEUE_SECS", default = "60")]
    pub pause_requeue_secs: u64,

    #[envconfig(from = "GAMELY_BACKOFF_BASE_SECS", default = "5")]
    pub backoff_base_secs: u64,

    #[envconfig(from = "GAMELY_BACKOFF_MAX_SECS", default = "300")]
    pub backoff_max_secs: u64,

    #[envconfig(from = "GAMELY_FIELD_MANAGER", default = "gamely-operator")]
    pub field_manager: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Valheim,
    Minecraft,
}

impl FromStr for Kind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valheim" => Ok(Kind::Valheim),
            "minecraft" => Ok(Kind::Minecraft),
            other => Err(Error::Config(format!("unknown controller {other:?}"))),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Valheim => "valheim",
            Kind::Minecraft => "minecraft",
        })
    }
}

impl OperatorConfig {
    /// Kinds named in `controllers`, in order, without duplicates.
    pub fn enabled_kinds(&self) -> Result<Vec<Kind>> {
        let mut kinds = Vec::new();
        for part in self.controllers.split(',').filter(|p| !p.trim().is_empty()) {
            let kind: Kind = part.parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enabled_kinds()?.is_empty() {
            return Err(Error::Config("no controllers enabled".into()));
        }
        if self.backoff_base_secs == 0 {
            return Err(Error::Config("backoff base must be at least 1s".into()));
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            return Err(Error::Config(format!(
                "backoff max {}s is below base {}s",
                self.backoff_max_secs, self.backoff_base_secs
            )));
        }
        if self.field_manager.trim().is_empty() {
            return Err(Error::Config("field manager must not be empty".into()));
        }
        Ok(())
    }

    pub fn pause_requeue(&self) -> Duration {
        Duration::from_secs(self.pause_requeue_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

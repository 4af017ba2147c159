use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const READY: &str = "Ready";
pub const REASON_CONVERGED: &str = "Converged";
pub const REASON_RECONCILE_FAILED: &str = "ReconcileFailed";

/// Status shared by every game server kind.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameServerStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world_storage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl GameServerStatus {
    /// Records a converged generation. Never moves `observedGeneration` backwards.
    pub fn mark_converged(&mut self, generation: i64) {
        self.observed_generation = self.observed_generation.max(generation);
        self.ready = true;
        self.set_condition(
            Condition::new(READY, ConditionStatus::True)
                .with_reason(REASON_CONVERGED)
                .with_generation(generation),
        );
    }

    pub fn mark_failed(&mut self, generation: i64, message: impl Into<String>) {
        self.ready = false;
        self.set_condition(
            Condition::new(READY, ConditionStatus::False)
                .with_reason(REASON_RECONCILE_FAILED)
                .with_message(message)
                .with_generation(generation),
        );
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Replaces the condition of the same type. The transition time is kept
    /// when the status value did not change.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == condition.type_) {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time.clone();
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Condition {
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            observed_generation: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.observed_generation = Some(generation);
        self
    }
}

use std::collections::BTreeMap;

use tracing::warn;

use crate::types::EnvVar;

/// Container environment in emission order.
///
/// The first variable with a given name wins. Later duplicates, including
/// user supplied extras that collide with a managed key, are dropped with a
/// warning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvList {
    vars: Vec<EnvVar>,
}

impl EnvList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(self, name: &str, value: impl Into<String>) -> Self {
        self.push(EnvVar::Value {
            name: name.to_string(),
            value: value.into(),
        })
    }

    pub fn secret(self, name: &str, secret_name: &str, key: &str) -> Self {
        self.push(EnvVar::SecretRef {
            name: name.to_string(),
            secret_name: secret_name.to_string(),
            key: key.to_string(),
        })
    }

    pub fn flag(self, enabled: bool, name: &str) -> Self {
        if enabled {
            self.value(name, "true")
        } else {
            self
        }
    }

    pub fn non_empty(self, name: &str, value: &str) -> Self {
        if value.is_empty() {
            self
        } else {
            self.value(name, value)
        }
    }

    /// Space separated, only when there is at least one item.
    pub fn joined(self, name: &str, items: &[String]) -> Self {
        if items.is_empty() {
            self
        } else {
            self.value(name, items.join(" "))
        }
    }

    pub fn entries<'a>(self, entries: impl IntoIterator<Item = (&'static str, &'a str)>) -> Self {
        entries
            .into_iter()
            .fold(self, |env, (name, value)| env.non_empty(name, value))
    }

    /// User supplied variables, passed through in key order.
    pub fn extra(self, extra: &BTreeMap<String, String>) -> Self {
        extra
            .iter()
            .fold(self, |env, (name, value)| env.value(name, value.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name() == name)
    }

    pub fn get(&self, name: &str) -> Option<&EnvVar> {
        self.vars.iter().find(|v| v.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(EnvVar::name).collect()
    }

    pub fn into_vars(self) -> Vec<EnvVar> {
        self.vars
    }

    fn push(mut self, var: EnvVar) -> Self {
        if self.contains(var.name()) {
            warn!(name = var.name(), "Dropping duplicate environment variable");
        } else {
            self.vars.push(var);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(env: &EnvList, name: &str) -> Option<String> {
        match env.get(name)? {
            EnvVar::Value { value, .. } => Some(value.clone()),
            EnvVar::SecretRef { .. } => None,
        }
    }

    #[test]
    fn managed_keys_win_over_extras() {
        let extra = BTreeMap::from([
            ("SERVER_NAME".to_string(), "hijack".to_string()),
            ("TZ".to_string(), "UTC".to_string()),
        ]);
        let env = EnvList::new().value("SERVER_NAME", "Midgard").extra(&extra);

        assert_eq!(env.names(), vec!["SERVER_NAME", "TZ"]);
        assert_eq!(value(&env, "SERVER_NAME").as_deref(), Some("Midgard"));
    }

    #[test]
    fn conditional_helpers_skip_empty_values() {
        let env = EnvList::new()
            .flag(false, "SERVER_PUBLIC")
            .non_empty("BACKUPS_CRON", "")
            .joined("ADMINLIST_IDS", &[])
            .joined("BANNEDLIST_IDS", &["1".to_string(), "2".to_string()]);

        assert_eq!(env.names(), vec!["BANNEDLIST_IDS"]);
        assert_eq!(value(&env, "BANNEDLIST_IDS").as_deref(), Some("1 2"));
    }

    #[test]
    fn extras_keep_key_order() {
        let extra = BTreeMap::from([
            ("B".to_string(), "2".to_string()),
            ("A".to_string(), "1".to_string()),
        ]);
        let env = EnvList::new().extra(&extra);
        assert_eq!(env.names(), vec!["A", "B"]);
    }
}

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Labels(pub BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.0.get(key)
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

/// Pod selector derived from a server's labels.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Selector(pub BTreeMap<String, String>);

impl Selector {
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl From<&Labels> for Selector {
    fn from(labels: &Labels) -> Self {
        Self(labels.0.clone())
    }
}

/// Metadata shared by every child: name, namespace, labels and at most one
/// owner. Empty labels stay unset.
pub fn object_meta(
    name: String,
    namespace: &str,
    labels: Labels,
    owner_ref: Option<OwnerReference>,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: Some(namespace.to_string()),
        labels: if labels.0.is_empty() {
            None
        } else {
            Some(labels.into_inner())
        },
        owner_references: owner_ref.map(|r| vec![r]),
        ..Default::default()
    }
}

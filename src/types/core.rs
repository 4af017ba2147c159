use super::{object_meta, ContainerPort, Labels, Protocol, Selector};
use crate::types::{ChildResource, ManagedFields};
use k8s_openapi::api::core::v1 as k8s;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct Secret {
    pub name: String,
    pub labels: Labels,
    pub type_: Option<String>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl Secret {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            type_: None,
            data: BTreeMap::new(),
        }
    }

    pub fn opaque(name: impl Into<String>) -> Self {
        Self::new(name).type_("Opaque")
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn type_(mut self, t: impl Into<String>) -> Self {
        self.type_ = Some(t.into());
        self
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl ChildResource for Secret {
    type K8sType = k8s::Secret;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        k8s::Secret {
            metadata: object_meta(self.name, namespace, self.labels, owner_ref),
            type_: self.type_,
            data: if self.data.is_empty() {
                None
            } else {
                Some(
                    self.data
                        .into_iter()
                        .map(|(k, v)| (k, ByteString(v)))
                        .collect(),
                )
            },
            ..Default::default()
        }
    }
}

/// Network endpoint in front of a workload. Selects pods by the workload's
/// labels.
#[derive(Clone, Debug)]
pub struct Service {
    pub name: String,
    pub labels: Labels,
    pub selector: Selector,
    pub ports: Vec<ServicePort>,
    pub type_: Option<String>,
}

impl Service {
    pub fn new(name: impl Into<String>, labels: &Labels) -> Self {
        Self {
            name: name.into(),
            labels: labels.clone(),
            selector: Selector::from(labels),
            ports: Vec::new(),
            type_: None,
        }
    }

    pub fn port(mut self, port: ServicePort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn type_(mut self, t: impl Into<String>) -> Self {
        self.type_ = Some(t.into());
        self
    }
}

impl ChildResource for Service {
    type K8sType = k8s::Service;

    // Everything else under spec, such as clusterIP, is assigned by the server.
    const MANAGED: ManagedFields = &[("spec", &["type", "ports", "selector"])];

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        k8s::Service {
            metadata: object_meta(self.name, namespace, self.labels, owner_ref),
            spec: Some(k8s::ServiceSpec {
                selector: Some(self.selector.into_inner()),
                ports: if self.ports.is_empty() {
                    None
                } else {
                    Some(self.ports.into_iter().map(|p| p.into_k8s()).collect())
                },
                type_: self.type_,
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServicePort {
    pub port: i32,
    pub target_port: i32,
    pub name: String,
    pub protocol: Protocol,
}

impl ServicePort {
    /// Exposes a container port on the same number and protocol.
    pub fn matching(port: &ContainerPort) -> Self {
        Self {
            port: port.container_port,
            target_port: port.container_port,
            name: port.name.clone(),
            protocol: port.protocol,
        }
    }

    pub fn into_k8s(self) -> k8s::ServicePort {
        k8s::ServicePort {
            port: self.port,
            target_port: Some(IntOrString::Int(self.target_port)),
            name: Some(self.name),
            protocol: Some(self.protocol.as_str().to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceAccount {
    pub name: String,
    pub labels: Labels,
}

impl ServiceAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }
}

impl ChildResource for ServiceAccount {
    type K8sType = k8s::ServiceAccount;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        k8s::ServiceAccount {
            metadata: object_meta(self.name, namespace, self.labels, owner_ref),
            ..Default::default()
        }
    }
}

use super::{object_meta, Container, Labels, Selector, Volume};
use crate::types::{ChildResource, ManagedFields};
use k8s_openapi::api::apps::v1 as apps;
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};

pub const ROLLING_UPDATE: &str = "RollingUpdate";

#[derive(Clone, Debug)]
pub struct StatefulSet {
    pub name: String,
    pub replicas: i32,
    pub labels: Labels,
    pub selector: Selector,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub service_name: String,
    pub service_account: Option<String>,
    pub share_process_namespace: bool,
    pub update_strategy: Option<String>,
}

impl StatefulSet {
    pub fn new(name: impl Into<String>, labels: &Labels) -> Self {
        let name = name.into();
        Self {
            service_name: name.clone(),
            name,
            replicas: 1,
            labels: labels.clone(),
            selector: Selector::from(labels),
            containers: Vec::new(),
            volumes: Vec::new(),
            service_account: None,
            share_process_namespace: false,
            update_strategy: None,
        }
    }

    pub fn replicas(mut self, n: i32) -> Self {
        self.replicas = n;
        self
    }

    pub fn container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }

    pub fn volume(mut self, volume: Volume) -> Self {
        self.volumes.push(volume);
        self
    }

    pub fn service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = Some(name.into());
        self
    }

    pub fn share_process_namespace(mut self) -> Self {
        self.share_process_namespace = true;
        self
    }

    pub fn rolling_update(mut self) -> Self {
        self.update_strategy = Some(ROLLING_UPDATE.to_string());
        self
    }
}

impl ChildResource for StatefulSet {
    type K8sType = apps::StatefulSet;

    const MANAGED: ManagedFields = &[
        (
            "spec",
            &["replicas", "selector", "serviceName", "updateStrategy", "template"],
        ),
        (
            "spec/template/spec",
            &["containers", "volumes", "serviceAccountName", "shareProcessNamespace"],
        ),
        (
            "spec/template/spec/containers/*",
            &[
                "image",
                "imagePullPolicy",
                "command",
                "args",
                "ports",
                "env",
                "resources",
                "volumeMounts",
                "securityContext",
            ],
        ),
        ("spec/template/spec/containers/*/resources", &["limits", "requests"]),
    ];

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        apps::StatefulSet {
            metadata: object_meta(self.name, namespace, self.labels.clone(), owner_ref),
            spec: Some(apps::StatefulSetSpec {
                replicas: Some(self.replicas),
                selector: LabelSelector {
                    match_labels: Some(self.selector.into_inner()),
                    match_expressions: None,
                },
                service_name: self.service_name,
                update_strategy: self.update_strategy.map(|type_| {
                    apps::StatefulSetUpdateStrategy {
                        type_: Some(type_),
                        rolling_update: None,
                    }
                }),
                template: core::PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.into_inner()),
                        ..Default::default()
                    }),
                    spec: Some(core::PodSpec {
                        containers: self.containers.into_iter().map(|c| c.into_k8s()).collect(),
                        volumes: if self.volumes.is_empty() {
                            None
                        } else {
                            Some(self.volumes.into_iter().map(|v| v.into_k8s()).collect())
                        },
                        service_account_name: self.service_account,
                        share_process_namespace: self.share_process_namespace.then_some(true),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct PersistentVolumeClaim {
    pub name: String,
    pub labels: Labels,
    pub storage_class: Option<String>,
    pub access_modes: Vec<String>,
    pub storage: String,
}

impl PersistentVolumeClaim {
    pub fn new(name: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
            storage_class: None,
            access_modes: vec!["ReadWriteOnce".to_string()],
            storage: storage.into(),
        }
    }

    pub fn labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn storage_class(mut self, class: Option<impl Into<String>>) -> Self {
        self.storage_class = class.map(Into::into);
        self
    }
}

impl ChildResource for PersistentVolumeClaim {
    type K8sType = core::PersistentVolumeClaim;

    fn name(&self) -> &str {
        &self.name
    }

    fn into_k8s(self, namespace: &str, owner_ref: Option<OwnerReference>) -> Self::K8sType {
        core::PersistentVolumeClaim {
            metadata: object_meta(self.name, namespace, self.labels, owner_ref),
            spec: Some(core::PersistentVolumeClaimSpec {
                access_modes: Some(self.access_modes),
                storage_class_name: self.storage_class,
                resources: Some(core::VolumeResourceRequirements {
                    requests: Some(
                        [("storage".to_string(), Quantity(self.storage))]
                            .into_iter()
                            .collect(),
                    ),
                    limits: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// The `storage` request recorded on a live claim.
pub fn requested_storage(claim: &core::PersistentVolumeClaim) -> Option<&str> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.as_str())
}

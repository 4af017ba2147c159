use k8s_openapi::api::core::v1 as k8s;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub image_pull_policy: Option<String>,
    pub ports: Vec<ContainerPort>,
    pub env: Vec<EnvVar>,
    pub resources: Option<Resources>,
    pub volume_mounts: Vec<VolumeMount>,
    pub security_context: Option<SecurityContext>,
}

impl Container {
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            image_pull_policy: None,
            ports: Vec::new(),
            env: Vec::new(),
            resources: None,
            volume_mounts: Vec::new(),
            security_context: None,
        }
    }

    pub fn image_pull_policy(mut self, policy: Option<impl Into<String>>) -> Self {
        self.image_pull_policy = policy.map(Into::into);
        self
    }

    pub fn port(mut self, port: ContainerPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn env(mut self, vars: Vec<EnvVar>) -> Self {
        self.env = vars;
        self
    }

    pub fn resources(mut self, resources: Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn volume_mount(
        mut self,
        name: impl Into<String>,
        mount_path: impl Into<String>,
    ) -> Self {
        self.volume_mounts.push(VolumeMount {
            name: name.into(),
            mount_path: mount_path.into(),
        });
        self
    }

    pub fn security_context(mut self, ctx: SecurityContext) -> Self {
        self.security_context = Some(ctx);
        self
    }

    pub fn into_k8s(self) -> k8s::Container {
        k8s::Container {
            name: self.name,
            image: Some(self.image),
            image_pull_policy: self.image_pull_policy,
            ports: if self.ports.is_empty() {
                None
            } else {
                Some(self.ports.into_iter().map(|p| p.into_k8s()).collect())
            },
            env: if self.env.is_empty() {
                None
            } else {
                Some(self.env.into_iter().map(|e| e.into_k8s()).collect())
            },
            resources: self.resources.and_then(|r| r.into_k8s()),
            volume_mounts: if self.volume_mounts.is_empty() {
                None
            } else {
                Some(
                    self.volume_mounts
                        .into_iter()
                        .map(|v| v.into_k8s())
                        .collect(),
                )
            },
            security_context: self.security_context.map(|s| s.into_k8s()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

/// A named container port. Services target it by the same number.
#[derive(Clone, Debug)]
pub struct ContainerPort {
    pub container_port: i32,
    pub name: String,
    pub protocol: Protocol,
}

impl ContainerPort {
    pub fn udp(name: impl Into<String>, port: i32) -> Self {
        Self {
            container_port: port,
            name: name.into(),
            protocol: Protocol::Udp,
        }
    }

    pub fn tcp(name: impl Into<String>, port: i32) -> Self {
        Self {
            container_port: port,
            name: name.into(),
            protocol: Protocol::Tcp,
        }
    }

    pub fn into_k8s(self) -> k8s::ContainerPort {
        k8s::ContainerPort {
            container_port: self.container_port,
            name: Some(self.name),
            protocol: Some(self.protocol.as_str().to_string()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnvVar {
    Value {
        name: String,
        value: String,
    },
    SecretRef {
        name: String,
        secret_name: String,
        key: String,
    },
}

impl EnvVar {
    pub fn name(&self) -> &str {
        match self {
            EnvVar::Value { name, .. } | EnvVar::SecretRef { name, .. } => name,
        }
    }

    pub fn into_k8s(self) -> k8s::EnvVar {
        match self {
            EnvVar::Value { name, value } => k8s::EnvVar {
                name,
                value: Some(value),
                value_from: None,
            },
            EnvVar::SecretRef {
                name,
                secret_name,
                key,
            } => k8s::EnvVar {
                name,
                value: None,
                value_from: Some(k8s::EnvVarSource {
                    secret_key_ref: Some(k8s::SecretKeySelector {
                        name: secret_name,
                        key,
                        optional: None,
                    }),
                    ..Default::default()
                }),
            },
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Resources {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl Resources {
    pub fn new(
        limits: BTreeMap<String, String>,
        requests: BTreeMap<String, String>,
    ) -> Self {
        Self { requests, limits }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.limits.is_empty()
    }

    fn quantities(values: BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
        if values.is_empty() {
            None
        } else {
            Some(values.into_iter().map(|(k, v)| (k, Quantity(v))).collect())
        }
    }

    /// `None` when nothing is requested, so the field stays unset.
    pub fn into_k8s(self) -> Option<k8s::ResourceRequirements> {
        if self.is_empty() {
            return None;
        }
        Some(k8s::ResourceRequirements {
            requests: Self::quantities(self.requests),
            limits: Self::quantities(self.limits),
            ..Default::default()
        })
    }
}

#[derive(Clone, Debug)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

impl VolumeMount {
    pub fn into_k8s(self) -> k8s::VolumeMount {
        k8s::VolumeMount {
            name: self.name,
            mount_path: self.mount_path,
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SecurityContext {
    pub add_capabilities: Vec<String>,
}

impl SecurityContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_capability(mut self, capability: impl Into<String>) -> Self {
        self.add_capabilities.push(capability.into());
        self
    }

    pub fn into_k8s(self) -> k8s::SecurityContext {
        k8s::SecurityContext {
            capabilities: if self.add_capabilities.is_empty() {
                None
            } else {
                Some(k8s::Capabilities {
                    add: Some(self.add_capabilities),
                    drop: None,
                })
            },
            ..Default::default()
        }
    }
}

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event as CoreEvent, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use super::{Event, Object, ObjectStore};
use crate::error::{Error, Result};

/// [`ObjectStore`] backed by the Kubernetes API. `reporter` doubles as the
/// field manager on every write.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    reporter: String,
}

impl KubeStore {
    pub fn new(client: Client, reporter: impl Into<String>) -> Self {
        Self {
            client,
            reporter: reporter.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.reporter.clone()),
            ..Default::default()
        }
    }

    fn api_for<K: Object>(&self, obj: &K) -> Result<(Api<K>, String)> {
        let namespace = obj
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingField("metadata.name"))?;
        Ok((Api::namespaced(self.client.clone(), &namespace), name))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        match api.get(name).await {
            Ok(resource) => Ok(Some(resource)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K> {
        let (api, name) = self.api_for(obj)?;
        debug!(kind = %K::kind(&()), %name, "Creating");
        Ok(api.create(&self.post_params(), obj).await?)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K> {
        let (api, name) = self.api_for(obj)?;
        debug!(kind = %K::kind(&()), %name, "Replacing");
        Ok(api.replace(&name, &self.post_params(), obj).await?)
    }

    async fn update_status<K: Object>(&self, obj: &K) -> Result<K> {
        let (api, name) = self.api_for(obj)?;
        let body = serde_json::to_value(obj)?;

        // The resourceVersion makes the API server reject a stale status write.
        let patch = json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": body.get("status"),
        });

        Ok(api
            .patch_status(
                &name,
                &PatchParams {
                    field_manager: Some(self.reporter.clone()),
                    ..Default::default()
                },
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn record_event<K: Object>(&self, obj: &K, event: Event) -> Result<()> {
        let (_, name) = self.api_for(obj)?;
        let namespace = obj.namespace().unwrap_or_default();
        let api: Api<CoreEvent> = Api::namespaced(self.client.clone(), &namespace);

        let now = chrono::Utc::now();
        let event_name = format!(
            "{}.{:x}",
            name,
            now.timestamp_nanos_opt().unwrap_or_default()
        );

        let core_event = CoreEvent {
            metadata: ObjectMeta {
                name: Some(event_name),
                namespace: Some(namespace.clone()),
                ..Default::default()
            },
            type_: Some(event.type_.as_str().to_string()),
            reason: Some(event.reason),
            message: Some(event.message),
            involved_object: ObjectReference {
                api_version: Some(K::api_version(&()).to_string()),
                kind: Some(K::kind(&()).to_string()),
                name: Some(name),
                namespace: Some(namespace),
                uid: obj.uid(),
                resource_version: obj.resource_version(),
                ..Default::default()
            },
            first_timestamp: Some(Time(now)),
            last_timestamp: Some(Time(now)),
            count: Some(1),
            reporting_component: Some(self.reporter.clone()),
            reporting_instance: Some(
                std::env::var("POD_NAME").unwrap_or_else(|_| self.reporter.clone()),
            ),
            ..Default::default()
        };

        api.create(&self.post_params(), &core_event).await?;
        Ok(())
    }
}

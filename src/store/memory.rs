use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use kube::ResourceExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use super::{Event, EventType, Object, ObjectStore};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Update,
    UpdateStatus,
}

/// A write accepted by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Write {
    pub verb: Verb,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedEvent {
    pub kind: String,
    pub name: String,
    pub type_: EventType,
    pub reason: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Key {
    kind: String,
    namespace: String,
    name: String,
}

impl Key {
    fn new<K: Object>(namespace: &str, name: &str) -> Self {
        Self {
            kind: K::kind(&()).to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    fn of<K: Object>(obj: &K) -> Result<Self> {
        let namespace = obj
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let name = obj
            .meta()
            .name
            .as_deref()
            .ok_or(Error::MissingField("metadata.name"))?;
        Ok(Self::new::<K>(&namespace, name))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<Key, Value>,
    version: u64,
    uids: u64,
    writes: Vec<Write>,
    events: Vec<RecordedEvent>,
    failures: Vec<(Verb, String)>,
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn take_failure(&mut self, verb: Verb, key: &Key) -> Result<()> {
        match self
            .failures
            .iter()
            .position(|(v, kind)| *v == verb && *kind == key.kind)
        {
            Some(idx) => {
                self.failures.remove(idx);
                Err(Error::Store(format!("injected {verb:?} failure for {key}")))
            }
            None => Ok(()),
        }
    }

    fn record(&mut self, verb: Verb, key: &Key) {
        self.writes.push(Write {
            verb,
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        });
    }

    /// Stores a new object, assigning uid, generation and version.
    fn admit(&mut self, key: Key, mut value: Value) -> Result<Value> {
        let version = self.next_version();
        self.uids += 1;
        let uid = format!("00000000-0000-0000-0000-{:012}", self.uids);

        let meta = metadata_mut(&mut value)?;
        meta.insert("resourceVersion".into(), json!(version));
        meta.entry("uid").or_insert_with(|| json!(uid));
        meta.entry("generation").or_insert_with(|| json!(1));

        self.objects.insert(key, value.clone());
        Ok(value)
    }

    /// Loads the stored copy and rejects a stale `resourceVersion`.
    fn current(&self, key: &Key, incoming: Option<&str>) -> Result<Value> {
        let stored = self
            .objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let stored_version = stored
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str);
        if incoming != stored_version {
            return Err(Error::Conflict(format!(
                "{key}: resourceVersion {} is stale, current is {}",
                incoming.unwrap_or("<none>"),
                stored_version.unwrap_or("<none>"),
            )));
        }
        Ok(stored.clone())
    }
}

fn metadata_mut(value: &mut Value) -> Result<&mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or(Error::MissingField("metadata"))?
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or(Error::MissingField("metadata"))
}

fn set_field(value: &mut Value, field: &str, content: Option<Value>) {
    if let Some(object) = value.as_object_mut() {
        match content {
            Some(content) => {
                object.insert(field.to_string(), content);
            }
            None => {
                object.remove(field);
            }
        }
    }
}

/// In-process [`ObjectStore`] with the API server's concurrency rules.
///
/// Writes bump `resourceVersion` and are checked against it. A spec change
/// bumps `metadata.generation`. `update` never touches status and
/// `update_status` touches nothing else. Every accepted write is logged so
/// callers can assert on write counts.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places an object as another actor would, without logging a write.
    /// Replaces any stored copy.
    pub fn insert<K: Object>(&self, obj: &K) -> Result<K> {
        let key = Key::of(obj)?;
        let value = serde_json::to_value(obj)?;
        let mut inner = self.inner.lock();
        inner.objects.remove(&key);
        let stored = inner.admit(key, value)?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Edits a stored object in place as another actor would: the spec
    /// change bumps generation and version, without logging a write.
    pub fn edit<K: Object>(
        &self,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut K),
    ) -> Result<K> {
        let key = Key::new::<K>(namespace, name);
        let mut inner = self.inner.lock();
        let stored = inner
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))?;

        let mut obj: K = serde_json::from_value(stored.clone())?;
        edit(&mut obj);
        let mut value = serde_json::to_value(&obj)?;

        let mut generation = stored
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        if value.get("spec") != stored.get("spec") {
            generation += 1;
        }
        let version = inner.next_version();
        let meta = metadata_mut(&mut value)?;
        meta.insert("generation".into(), json!(generation));
        meta.insert("resourceVersion".into(), json!(version));

        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    pub fn get_now<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
        let key = Key::new::<K>(namespace, name);
        let inner = self.inner.lock();
        inner
            .objects
            .get(&key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains<K: Object>(&self, namespace: &str, name: &str) -> bool {
        let key = Key::new::<K>(namespace, name);
        self.inner.lock().objects.contains_key(&key)
    }

    /// Number of stored objects of kind `K`.
    pub fn count<K: Object>(&self) -> usize {
        let kind = K::kind(&());
        self.inner
            .lock()
            .objects
            .keys()
            .filter(|k| k.kind == kind.as_ref())
            .count()
    }

    pub fn writes(&self) -> Vec<Write> {
        self.inner.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.inner.lock().writes.len()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.inner.lock().events.clone()
    }

    /// Makes the next `verb` on `kind` fail once.
    pub fn fail_next(&self, verb: Verb, kind: impl Into<String>) {
        self.inner.lock().failures.push((verb, kind.into()));
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let key = Key::new::<K>(namespace, name);
        let mut inner = self.inner.lock();
        inner.take_failure(Verb::Get, &key)?;
        match inner.objects.get(&key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K> {
        let key = Key::of(obj)?;
        let value = serde_json::to_value(obj)?;
        let mut inner = self.inner.lock();
        inner.take_failure(Verb::Create, &key)?;
        if inner.objects.contains_key(&key) {
            return Err(Error::AlreadyExists(key.to_string()));
        }

        inner.record(Verb::Create, &key);
        let stored = inner.admit(key, value)?;
        Ok(serde_json::from_value(stored)?)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K> {
        let key = Key::of(obj)?;
        let mut value = serde_json::to_value(obj)?;
        let mut inner = self.inner.lock();
        inner.take_failure(Verb::Update, &key)?;
        let stored = inner.current(&key, obj.meta().resource_version.as_deref())?;

        set_field(&mut value, "status", stored.get("status").cloned());

        let mut generation = stored
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        if value.get("spec") != stored.get("spec") {
            generation += 1;
        }

        let version = inner.next_version();
        let meta = metadata_mut(&mut value)?;
        meta.insert("resourceVersion".into(), json!(version));
        meta.insert("generation".into(), json!(generation));
        for preserved in ["uid", "deletionTimestamp"] {
            match stored.pointer(&format!("/metadata/{preserved}")) {
                Some(v) => meta.insert(preserved.into(), v.clone()),
                None => meta.remove(preserved),
            };
        }

        inner.record(Verb::Update, &key);
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn update_status<K: Object>(&self, obj: &K) -> Result<K> {
        let key = Key::of(obj)?;
        let incoming = serde_json::to_value(obj)?;
        let mut inner = self.inner.lock();
        inner.take_failure(Verb::UpdateStatus, &key)?;
        let mut stored = inner.current(&key, obj.meta().resource_version.as_deref())?;

        set_field(&mut stored, "status", incoming.get("status").cloned());
        let version = inner.next_version();
        metadata_mut(&mut stored)?.insert("resourceVersion".into(), json!(version));

        inner.record(Verb::UpdateStatus, &key);
        inner.objects.insert(key, stored.clone());
        Ok(serde_json::from_value(stored)?)
    }

    async fn record_event<K: Object>(&self, obj: &K, event: Event) -> Result<()> {
        self.inner.lock().events.push(RecordedEvent {
            kind: K::kind(&()).to_string(),
            name: obj.name_any(),
            type_: event.type_,
            reason: event.reason,
            message: event.message,
        });
        Ok(())
    }
}

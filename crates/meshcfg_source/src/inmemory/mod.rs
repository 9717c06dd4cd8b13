//! In-memory resource store reconciled per content name.
//!
//! Content (usually a file) is parsed as multi-document YAML. Each call to
//! [`KubeSource::apply_content`] replaces everything previously sourced from
//! the same name and emits only the difference.

use crate::error::{Result, SourceError};
use meshcfg_event::{
    combine_handlers, sentinel_handler, Body, Event, FullName, Handler, Metadata, Resource,
    Schema, Schemas, Source, Version,
};
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct ResourceKey {
    collection: String,
    full_name: FullName,
}

/// One parsed document, ready to be stored.
struct Parsed {
    key: ResourceKey,
    schema: Schema,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    body: Body,
    sha: String,
}

struct State {
    started: bool,
    handler: Arc<dyn Handler>,
    default_namespace: String,
    version_counter: u64,
    collections: BTreeMap<String, BTreeMap<FullName, Resource>>,
    shas: HashMap<ResourceKey, String>,
    by_content: HashMap<String, BTreeSet<ResourceKey>>,
    /// Content name that last applied each key. Only the owner may retract it.
    owners: HashMap<ResourceKey, String>,
}

/// Kubernetes-style resource store fed by YAML content.
///
/// Events are delivered while the store lock is held; handlers must not call
/// back into the store.
pub struct KubeSource {
    schemas: Schemas,
    state: Mutex<State>,
}

impl KubeSource {
    pub fn new(schemas: Schemas) -> Self {
        Self {
            schemas,
            state: Mutex::new(State {
                started: false,
                handler: sentinel_handler(),
                default_namespace: String::new(),
                version_counter: 0,
                collections: BTreeMap::new(),
                shas: HashMap::new(),
                by_content: HashMap::new(),
                owners: HashMap::new(),
            }),
        }
    }

    pub fn schemas(&self) -> &Schemas {
        &self.schemas
    }

    /// Namespace given to namespaced resources that do not declare one.
    pub fn set_default_namespace(&self, namespace: impl Into<String>) {
        self.lock().default_namespace = namespace.into();
    }

    /// Replace the resources sourced from `name` with those parsed from `yaml`.
    ///
    /// A YAML syntax error fails the whole call and leaves the store untouched.
    /// Individually invalid documents are logged and skipped. When several
    /// contents define the same resource, the last one applied owns it.
    pub fn apply_content(&self, name: &str, yaml: &str) -> Result<()> {
        let mut documents = Vec::new();
        for de in serde_yaml::Deserializer::from_str(yaml) {
            documents.push(serde_yaml::Value::deserialize(de)?);
        }

        let mut state = self.lock();
        let mut parsed = Vec::new();
        for doc in documents {
            if doc.is_null() {
                continue;
            }
            match self.parse_document(name, doc, &state.default_namespace) {
                Ok(p) => parsed.push(p),
                Err(e) => warn!(content = %name, "Skipping document: {}", e),
            }
        }

        let mut new_keys = BTreeSet::new();
        for p in parsed {
            new_keys.insert(p.key.clone());
            state.owners.insert(p.key.clone(), name.to_string());
            if state.shas.get(&p.key) == Some(&p.sha) {
                continue;
            }
            state.set(p);
        }

        let old_keys = state.by_content.remove(name).unwrap_or_default();
        for key in old_keys.difference(&new_keys) {
            state.remove_owned(name, key);
        }
        if !new_keys.is_empty() {
            state.by_content.insert(name.to_string(), new_keys);
        }
        Ok(())
    }

    /// Retract every resource sourced from `name`.
    pub fn remove_content(&self, name: &str) {
        let mut state = self.lock();
        if let Some(keys) = state.by_content.remove(name) {
            for key in &keys {
                state.remove_owned(name, key);
            }
        }
    }

    pub fn content_names(&self) -> HashSet<String> {
        self.lock().by_content.keys().cloned().collect()
    }

    pub fn get(&self, collection: &str, full_name: &FullName) -> Option<Resource> {
        self.lock()
            .collections
            .get(collection)
            .and_then(|c| c.get(full_name))
            .cloned()
    }

    /// All resources held, ordered by collection then name.
    pub fn resources(&self) -> Vec<Resource> {
        self.lock()
            .collections
            .values()
            .flat_map(|c| c.values().cloned())
            .collect()
    }

    /// Drop all held state without emitting events.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.collections.clear();
        state.shas.clear();
        state.by_content.clear();
        state.owners.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn parse_document(
        &self,
        content: &str,
        doc: serde_yaml::Value,
        default_namespace: &str,
    ) -> Result<Parsed> {
        let invalid = |message: String| SourceError::InvalidContent {
            path: content.to_string(),
            message,
        };
        let value: Value = serde_json::to_value(doc)?;
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing apiVersion".to_string()))?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing kind".to_string()))?;
        let metadata = value.get("metadata").cloned().unwrap_or(Value::Null);
        let name = metadata
            .get("name")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("missing metadata.name".to_string()))?;

        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g, v),
            None => ("", api_version),
        };
        let schema = self
            .schemas
            .find_by_group_version_kind(group, version, kind)
            .ok_or_else(|| invalid(format!("unrecognized type {}/{}", api_version, kind)))?
            .clone();

        let namespace = if schema.is_cluster_scoped() {
            String::new()
        } else {
            metadata
                .get("namespace")
                .and_then(Value::as_str)
                .filter(|ns| !ns.is_empty())
                .unwrap_or(default_namespace)
                .to_string()
        };
        let full_name = FullName::new(namespace, name);

        let body = match value.get("spec") {
            Some(spec) => spec.clone(),
            None => strip_envelope(&value),
        };
        schema
            .validate(&full_name, &body)
            .map_err(|e| invalid(format!("{} {} failed validation: {}", schema, full_name, e)))?;

        let sha = hex::encode(Sha256::digest(value.to_string().as_bytes()));
        Ok(Parsed {
            key: ResourceKey {
                collection: schema.name().to_string(),
                full_name,
            },
            labels: string_map(metadata.get("labels")).map_err(invalid)?,
            annotations: string_map(metadata.get("annotations")).map_err(invalid)?,
            schema,
            body,
            sha,
        })
    }
}

impl State {
    fn set(&mut self, p: Parsed) {
        self.version_counter += 1;
        let mut metadata = Metadata::new(p.schema, p.key.full_name.clone());
        metadata.labels = p.labels;
        metadata.annotations = p.annotations;
        metadata.version = Version::new(format!("v{}", self.version_counter));
        let resource = Resource::new(metadata, p.body);

        let previous = self
            .collections
            .entry(p.key.collection.clone())
            .or_default()
            .insert(p.key.full_name.clone(), resource.clone());
        self.shas.insert(p.key, p.sha);

        if self.started {
            let event = match previous {
                Some(_) => Event::updated(resource),
                None => Event::added(resource),
            };
            debug!(event = %event, "Emitting");
            self.handler.handle(&event);
        }
    }

    /// Retract `key` unless another content has claimed it since `name` applied it.
    fn remove_owned(&mut self, name: &str, key: &ResourceKey) {
        if self.owners.get(key).map(String::as_str) != Some(name) {
            debug!(content = %name, resource = %key.full_name, "Resource owned elsewhere; keeping");
            return;
        }
        self.owners.remove(key);
        self.shas.remove(key);
        let removed = self
            .collections
            .get_mut(&key.collection)
            .and_then(|c| c.remove(&key.full_name));
        if let (Some(resource), true) = (removed, self.started) {
            let event = Event::deleted(resource);
            debug!(event = %event, "Emitting");
            self.handler.handle(&event);
        }
    }
}

fn strip_envelope(value: &Value) -> Body {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !matches!(k.as_str(), "apiVersion" | "kind" | "metadata" | "status"))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn string_map(value: Option<&Value>) -> std::result::Result<BTreeMap<String, String>, String> {
    let Some(Value::Object(map)) = value else {
        return Ok(BTreeMap::new());
    };
    map.iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            other => Err(format!("non-string value for {}: {}", k, other)),
        })
        .collect()
}

impl Source for KubeSource {
    /// Emits Added for everything held, then one FullSync per schema.
    fn start(&self) {
        let mut state = self.lock();
        if state.started {
            return;
        }
        state.started = true;

        for resource in state.collections.values().flat_map(|c| c.values()) {
            state.handler.handle(&Event::added(resource.clone()));
        }
        let mut schemas: Vec<&Schema> = self.schemas.iter().collect();
        schemas.sort();
        for schema in schemas {
            state.handler.handle(&Event::full_sync_for(schema));
        }
    }

    fn stop(&self) {
        self.lock().started = false;
    }

    fn dispatch(&self, handler: Arc<dyn Handler>) {
        let mut state = self.lock();
        state.handler = combine_handlers(Arc::clone(&state.handler), handler);
    }
}

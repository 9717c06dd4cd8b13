//! Resource model: names, metadata and opaque bodies.

use crate::error::{ModelError, Result};
use crate::schema::Schema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Schema-specific payload. The core never looks inside it.
pub type Body = serde_json::Value;

/// Namespace + name, unique among live resources of one schema.
///
/// Cluster-scoped resources have an empty namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FullName {
    pub namespace: String,
    pub name: String,
}

impl FullName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self::new("", name)
    }

    /// Parse `ns/name` or a bare `name`.
    pub fn parse(value: &str) -> Result<Self> {
        let (namespace, name) = match value.split_once('/') {
            Some((ns, name)) => (ns, name),
            None => ("", value),
        };
        if name.is_empty() || name.contains('/') {
            return Err(ModelError::InvalidName(value.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// Opaque ordering token assigned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub full_name: FullName,
    /// Back-reference to the schema this resource belongs to.
    pub schema: Schema,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub version: Version,
    pub create_time: Option<DateTime<Utc>>,
}

impl Metadata {
    pub fn new(schema: Schema, full_name: FullName) -> Self {
        Self {
            full_name,
            schema,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            version: Version::default(),
            create_time: None,
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// A configuration resource. Cloning shares the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub metadata: Metadata,
    pub body: Arc<Body>,
}

impl Resource {
    pub fn new(metadata: Metadata, body: Body) -> Self {
        Self {
            metadata,
            body: Arc::new(body),
        }
    }

    pub fn full_name(&self) -> &FullName {
        &self.metadata.full_name
    }

    pub fn schema(&self) -> &Schema {
        &self.metadata.schema
    }
}

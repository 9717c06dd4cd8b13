//! Schema (collection) descriptors and the read-only registry built from them.

use crate::error::{ModelError, Result};
use crate::resource::{Body, FullName};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Validates a resource body for a schema. `Err` carries a human readable reason.
pub type ValidateFn = fn(&FullName, &Body) -> std::result::Result<(), String>;

fn accept_all(_: &FullName, _: &Body) -> std::result::Result<(), String> {
    Ok(())
}

/// Registered resource-kind descriptor.
///
/// Cheap to clone; equality, ordering and hashing use the collection name only.
#[derive(Clone)]
pub struct Schema {
    inner: Arc<SchemaInner>,
}

struct SchemaInner {
    name: String,
    kind: String,
    plural: String,
    group: String,
    version: String,
    cluster_scoped: bool,
    validate: ValidateFn,
}

impl Schema {
    pub fn builder(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(name)
    }

    /// Collection name, e.g. `istio/networking/v1alpha3/virtualservices`.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn plural(&self) -> &str {
        &self.inner.plural
    }

    pub fn group(&self) -> &str {
        &self.inner.group
    }

    pub fn version(&self) -> &str {
        &self.inner.version
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.inner.cluster_scoped
    }

    /// `group/version`, or just `version` for the core group.
    pub fn api_version(&self) -> String {
        if self.inner.group.is_empty() {
            self.inner.version.clone()
        } else {
            format!("{}/{}", self.inner.group, self.inner.version)
        }
    }

    /// `group/version/kind`, used in log lines.
    pub fn group_version_kind(&self) -> String {
        format!("{}/{}", self.api_version(), self.inner.kind)
    }

    pub fn validate(&self, name: &FullName, body: &Body) -> std::result::Result<(), String> {
        (self.inner.validate)(name, body)
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl PartialOrd for Schema {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Schema {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.inner.name.cmp(&other.inner.name)
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("name", &self.inner.name)
            .field("gvk", &self.group_version_kind())
            .field("plural", &self.inner.plural)
            .finish()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

pub struct SchemaBuilder {
    name: String,
    kind: String,
    plural: String,
    group: String,
    version: String,
    cluster_scoped: bool,
    validate: ValidateFn,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
            plural: String::new(),
            group: String::new(),
            version: String::new(),
            cluster_scoped: false,
            validate: accept_all,
        }
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = plural.into();
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn cluster_scoped(mut self, cluster_scoped: bool) -> Self {
        self.cluster_scoped = cluster_scoped;
        self
    }

    pub fn validate(mut self, validate: ValidateFn) -> Self {
        self.validate = validate;
        self
    }

    pub fn build(self) -> Result<Schema> {
        for (field, value) in [
            ("name", &self.name),
            ("kind", &self.kind),
            ("plural", &self.plural),
            ("version", &self.version),
        ] {
            if value.is_empty() {
                return Err(ModelError::InvalidSchema(format!(
                    "schema {:?} is missing {}",
                    self.name, field
                )));
            }
        }
        Ok(Schema {
            inner: Arc::new(SchemaInner {
                name: self.name,
                kind: self.kind,
                plural: self.plural,
                group: self.group,
                version: self.version,
                cluster_scoped: self.cluster_scoped,
                validate: self.validate,
            }),
        })
    }
}

/// Immutable, ordered set of schemas.
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    schemas: Vec<Schema>,
    by_name: BTreeMap<String, usize>,
}

impl Schemas {
    pub fn builder() -> SchemasBuilder {
        SchemasBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.by_name.get(name).map(|&idx| &self.schemas[idx])
    }

    pub fn find_by_group_version_kind(
        &self,
        group: &str,
        version: &str,
        kind: &str,
    ) -> Option<&Schema> {
        self.schemas
            .iter()
            .find(|s| s.group() == group && s.version() == version && s.kind() == kind)
    }

    pub fn all(&self) -> &[Schema] {
        &self.schemas
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schema> {
        self.schemas.iter()
    }

    /// Collection names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct SchemasBuilder {
    schemas: Schemas,
}

impl SchemasBuilder {
    pub fn add(mut self, schema: Schema) -> Result<Self> {
        if self.schemas.by_name.contains_key(schema.name()) {
            return Err(ModelError::DuplicateSchema(schema.name().to_string()));
        }
        self.schemas
            .by_name
            .insert(schema.name().to_string(), self.schemas.schemas.len());
        self.schemas.schemas.push(schema);
        Ok(self)
    }

    pub fn build(self) -> Schemas {
        self.schemas
    }
}

/// Test-only schema: `test.istio.io/v1 MockConfig`. Rejects bodies with an empty `key`.
pub fn mock() -> Schema {
    fn validate_mock(_: &FullName, body: &Body) -> std::result::Result<(), String> {
        match body.get("key").and_then(|v| v.as_str()) {
            Some(key) if !key.is_empty() => Ok(()),
            _ => Err("empty key".to_string()),
        }
    }

    Schema {
        inner: Arc::new(SchemaInner {
            name: "mock".to_string(),
            kind: "MockConfig".to_string(),
            plural: "mockconfigs".to_string(),
            group: "test.istio.io".to_string(),
            version: "v1".to_string(),
            cluster_scoped: false,
            validate: validate_mock,
        }),
    }
}

/// A registry containing only [`mock`].
pub fn mocks() -> Schemas {
    let schema = mock();
    Schemas {
        by_name: BTreeMap::from([(schema.name().to_string(), 0)]),
        schemas: vec![schema],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_requires_fields() {
        let err = Schema::builder("k8s/core/v1/pods").kind("Pod").build().unwrap_err();
        assert!(matches!(err, ModelError::InvalidSchema(_)));
    }

    #[test]
    fn test_lookup_by_name_and_gvk() {
        let pods = Schema::builder("k8s/core/v1/pods")
            .kind("Pod")
            .plural("pods")
            .version("v1")
            .build()
            .unwrap();
        let schemas = Schemas::builder()
            .add(pods.clone())
            .unwrap()
            .add(mock())
            .unwrap()
            .build();

        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas.get("k8s/core/v1/pods"), Some(&pods));
        assert_eq!(schemas.find_by_group_version_kind("", "v1", "Pod"), Some(&pods));
        assert_eq!(
            schemas
                .find_by_group_version_kind("test.istio.io", "v1", "MockConfig")
                .map(Schema::name),
            Some("mock")
        );
        assert!(schemas.find_by_group_version_kind("", "v2", "Pod").is_none());
        assert_eq!(pods.api_version(), "v1");
        assert_eq!(mock().api_version(), "test.istio.io/v1");
    }

    #[test]
    fn test_duplicate_schema_rejected() {
        let err = Schemas::builder().add(mock()).unwrap().add(mock()).unwrap_err();
        assert_eq!(err, ModelError::DuplicateSchema("mock".to_string()));
    }

    #[test]
    fn test_mock_validation() {
        let name = FullName::new("ns", "n");
        assert!(mock().validate(&name, &json!({"key": "k"})).is_ok());
        assert_eq!(mock().validate(&name, &json!({})), Err("empty key".to_string()));
    }
}

use crate::resource::Resource;
use crate::schema::Schema;
use std::fmt;

/// What happened to a resource, or the per-schema sync marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Added,
    Updated,
    Deleted,
    /// All resources of the schema present in the backend have been delivered at least once.
    FullSync,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Added => "Added",
            Kind::Updated => "Updated",
            Kind::Deleted => "Deleted",
            Kind::FullSync => "FullSync",
        };
        f.write_str(s)
    }
}

/// Canonical change event.
///
/// `resource` is always present for Added/Updated/Deleted and absent for FullSync.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: Kind,
    pub source: Schema,
    pub resource: Option<Resource>,
}

impl Event {
    /// Marker declaring that `schema` has finished its initial enumeration.
    pub fn full_sync_for(schema: &Schema) -> Self {
        Self {
            kind: Kind::FullSync,
            source: schema.clone(),
            resource: None,
        }
    }

    /// Resource event for `kind`. The source schema is taken from the resource metadata.
    pub fn for_resource(kind: Kind, resource: Resource) -> Self {
        debug_assert!(kind != Kind::FullSync, "FullSync events carry no resource");
        Self {
            kind,
            source: resource.metadata.schema.clone(),
            resource: Some(resource),
        }
    }

    pub fn added(resource: Resource) -> Self {
        Self::for_resource(Kind::Added, resource)
    }

    pub fn updated(resource: Resource) -> Self {
        Self::for_resource(Kind::Updated, resource)
    }

    pub fn deleted(resource: Resource) -> Self {
        Self::for_resource(Kind::Deleted, resource)
    }

    /// Same event re-kinded.
    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_full_sync(&self) -> bool {
        self.kind == Kind::FullSync
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource {
            Some(r) => write!(
                f,
                "[Event]({}: {}/{} @{})",
                self.kind,
                self.source,
                r.metadata.full_name,
                r.metadata.version
            ),
            None => write!(f, "[Event]({}: {})", self.kind, self.source),
        }
    }
}

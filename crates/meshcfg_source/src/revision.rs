//! Staged-rollout (revision) filtering.
//!
//! A control plane instance runs at a revision. Resources of revision-aware
//! kinds that carry a different, non-empty revision label belong to another
//! instance and are treated as not present here.

use meshcfg_event::{Kind, Resource, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label carrying the revision a resource is targeted at.
pub const REVISION_LABEL: &str = "istio.io/rev";

/// Environment variable holding this instance's revision.
pub const REVISION_ENV: &str = "istio-revision";

/// Environment variable holding the comma separated plural names of revision-aware kinds.
pub const REVISION_AWARE_KINDS_ENV: &str = "rev-crds";

/// Immutable revision configuration, read once and passed to watchers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionFilter {
    /// Target revision. Empty accepts everything.
    #[serde(default)]
    pub revision: String,
    /// Plural names (e.g. `virtualservices`) subject to filtering.
    #[serde(default)]
    pub aware_plurals: BTreeSet<String>,
}

impl RevisionFilter {
    pub fn new<I, S>(revision: impl Into<String>, aware_plurals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            revision: revision.into(),
            aware_plurals: aware_plurals.into_iter().map(Into::into).collect(),
        }
    }

    /// Read the filter from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the filter through an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let revision = lookup(REVISION_ENV).unwrap_or_default();
        let plurals = lookup(REVISION_AWARE_KINDS_ENV).unwrap_or_default();
        Self {
            revision,
            aware_plurals: parse_plurals(&plurals),
        }
    }

    pub fn is_revision_aware(&self, schema: &Schema) -> bool {
        self.aware_plurals.contains(schema.plural())
    }

    /// True when `resource` belongs to another revision and must be hidden from this instance.
    pub fn skips(&self, resource: &Resource) -> bool {
        if self.revision.is_empty() || !self.is_revision_aware(resource.schema()) {
            return false;
        }
        match resource.metadata.label(REVISION_LABEL) {
            Some(rev) => !rev.is_empty() && rev != self.revision,
            None => false,
        }
    }

    /// Map an incoming event kind to the kind to deliver, or `None` to drop it.
    ///
    /// Skipped resources: Added is dropped, Updated becomes Deleted (so a consumer
    /// that saw the resource under an accepted revision removes it), Deleted passes.
    pub fn admit(&self, kind: Kind, resource: &Resource) -> Option<Kind> {
        if !self.skips(resource) {
            return Some(kind);
        }
        match kind {
            Kind::Updated => Some(Kind::Deleted),
            Kind::Deleted => Some(Kind::Deleted),
            Kind::Added | Kind::FullSync => None,
        }
    }
}

fn parse_plurals(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

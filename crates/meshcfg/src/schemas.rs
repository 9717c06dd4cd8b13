//! Built-in schema registry served by the daemon.

use meshcfg_event::{Body, FullName, Result, Schema, Schemas};

const NETWORKING_GROUP: &str = "networking.istio.io";
const NETWORKING_VERSION: &str = "v1alpha3";

/// (kind, plural) of the networking kinds distributed by default.
const NETWORKING_KINDS: [(&str, &str); 6] = [
    ("DestinationRule", "destinationrules"),
    ("EnvoyFilter", "envoyfilters"),
    ("Gateway", "gateways"),
    ("ServiceEntry", "serviceentries"),
    ("Sidecar", "sidecars"),
    ("VirtualService", "virtualservices"),
];

fn validate_object(_: &FullName, body: &Body) -> std::result::Result<(), String> {
    if body.is_object() {
        Ok(())
    } else {
        Err("spec must be a mapping".to_string())
    }
}

/// Istio networking schemas, named `istio/networking/v1alpha3/<plural>`.
pub fn builtin() -> Result<Schemas> {
    let mut builder = Schemas::builder();
    for (kind, plural) in NETWORKING_KINDS {
        let schema = Schema::builder(format!("istio/networking/{}/{}", NETWORKING_VERSION, plural))
            .kind(kind)
            .plural(plural)
            .group(NETWORKING_GROUP)
            .version(NETWORKING_VERSION)
            .validate(validate_object)
            .build()?;
        builder = builder.add(schema)?;
    }
    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_lookup() {
        let schemas = builtin().unwrap();
        assert_eq!(schemas.len(), NETWORKING_KINDS.len());

        let vs = schemas
            .find_by_group_version_kind(NETWORKING_GROUP, NETWORKING_VERSION, "VirtualService")
            .expect("virtual services");
        assert_eq!(vs.name(), "istio/networking/v1alpha3/virtualservices");
        assert!(!vs.is_cluster_scoped());

        let name = FullName::new("ns", "a");
        assert!(vs.validate(&name, &json!({"hosts": ["a"]})).is_ok());
        assert!(vs.validate(&name, &json!("text")).is_err());
    }
}

//! JSON payloads carried in frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Code, Status};

/// Identifies the sink to the resource source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkNode {
    pub id: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Reason a response was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: i32,
    pub message: String,
}

impl From<&Status> for ErrorDetail {
    fn from(status: &Status) -> Self {
        Self {
            code: status.code.as_i32(),
            message: status.message.clone(),
        }
    }
}

impl ErrorDetail {
    pub fn code(&self) -> Code {
        Code::from_i32(self.code)
    }
}

/// Sink -> source. Doubles as initial request, ACK and NACK:
/// an empty `response_nonce` is an initial request, `error_detail` makes it a NACK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResources {
    pub sink_node: SinkNode,
    pub collection: String,
    #[serde(default)]
    pub response_nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
    #[serde(default)]
    pub incremental: bool,
}

impl RequestResources {
    pub fn is_nack(&self) -> bool {
        self.error_detail.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMetadata {
    /// `namespace/name`, or `name` for cluster-scoped resources.
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResource {
    pub metadata: WireMetadata,
    #[serde(default)]
    pub body: serde_json::Value,
}

/// Source -> sink. Without `incremental`, `resources` is the full state of the collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub system_version_info: String,
    pub collection: String,
    #[serde(default)]
    pub resources: Vec<WireResource>,
    #[serde(default)]
    pub removed_resources: Vec<String>,
    pub nonce: String,
    #[serde(default)]
    pub incremental: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resources_defaults() {
        let r: Resources = serde_json::from_value(json!({
            "collection": "mock",
            "nonce": "n1",
            "resources": [{"metadata": {"name": "ns/a"}, "body": {"key": "x"}}]
        }))
        .unwrap();
        assert!(!r.incremental);
        assert!(r.removed_resources.is_empty());
        assert_eq!(r.resources[0].metadata.name, "ns/a");
        assert_eq!(r.resources[0].metadata.version, "");
    }

    #[test]
    fn test_ack_omits_error_detail() {
        let ack = RequestResources {
            collection: "mock".into(),
            response_nonce: "n1".into(),
            ..RequestResources::default()
        };
        let v = serde_json::to_value(&ack).unwrap();
        assert!(v.get("error_detail").is_none());
        assert!(!ack.is_nack());
    }
}

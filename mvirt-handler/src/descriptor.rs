//! Resource descriptor passed between the orchestrator and the handlers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clients::RemoteResource;

/// Desired state of a resource plus the identifiers discovered so far.
///
/// The orchestrator owns the descriptor. Handlers only read it and fill in
/// what the remote side reports (assigned id, status, properties).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning container, e.g. the project of a volume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Identifier label for log lines.
    pub fn display_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("<unnamed>")
    }

    pub fn u64_property(&self, key: &str) -> Option<u64> {
        self.properties.get(key).and_then(Value::as_u64)
    }

    /// Overlay what the remote system reported.
    ///
    /// Remote properties win over desired ones so the orchestrator sees
    /// the actual state after a read-back.
    pub fn merge_remote(&mut self, remote: &RemoteResource) {
        self.id = Some(remote.id.clone());
        if remote.name.is_some() {
            self.name = remote.name.clone();
        }
        if remote.parent_id.is_some() {
            self.parent_id = remote.parent_id.clone();
        }
        self.status = Some(remote.status.clone());
        self.status_reason = remote.status_reason.clone();
        for (k, v) in &remote.properties {
            self.properties.insert(k.clone(), v.clone());
        }
    }
}

//! Remote API clients.
//!
//! Handlers talk to the system that actually owns the resources through
//! [`RemoteClient`]. Real clients live with their services (mvirt-vmm,
//! mvirt-zfs); this crate ships:
//! - memory: in-process simulation used by the CLI and tests

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::ResourceDescriptor;
use crate::error::RemoteResult;

pub use memory::MemoryRemote;

/// Resource as reported by the remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteResource {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Raw status string, classified by the resource type's status table.
    pub status: String,
    /// Failure detail accompanying a failed status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Filter for list calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
}

impl From<&ResourceDescriptor> for ListFilter {
    fn from(desc: &ResourceDescriptor) -> Self {
        Self {
            parent_id: desc.parent_id.clone(),
            name_prefix: desc.name.clone(),
        }
    }
}

/// One page of a list call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage {
    pub items: Vec<RemoteResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Client for the remote API owning one resource type.
///
/// Every call returns a tagged [`RemoteResult`]; "not found" and
/// "conflict" are ordinary outcomes.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Create the resource. The remote deduplicates on `request_token`.
    async fn create(
        &self,
        desc: &ResourceDescriptor,
        request_token: &str,
    ) -> RemoteResult<RemoteResource>;

    /// Apply the desired state to an existing resource.
    async fn update(&self, desc: &ResourceDescriptor) -> RemoteResult<RemoteResource>;

    /// Start deleting the resource.
    async fn delete(&self, desc: &ResourceDescriptor, request_token: &str) -> RemoteResult<()>;

    /// Read current state by id.
    async fn read(&self, id: &str) -> RemoteResult<RemoteResource>;

    /// List resources, one page at a time.
    async fn list(&self, filter: &ListFilter, page_token: Option<&str>) -> RemoteResult<ListPage>;
}

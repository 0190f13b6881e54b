//! In-memory remote used for simulation and tests.
//!
//! Behaves like a remote API with asynchronous provisioning: mutating calls
//! only move a resource into a transitional status, and the statuses later
//! reads observe are scripted per resource id.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ListFilter, ListPage, RemoteClient, RemoteResource};
use crate::descriptor::ResourceDescriptor;
use crate::error::{RemoteError, RemoteResult};
use crate::resources::volume;

const DEFAULT_PAGE_SIZE: usize = 50;

/// Remote call kinds, for counters and error injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Create,
    Update,
    Delete,
    Read,
    List,
}

/// What the next read of a resource observes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ScriptedRead {
    /// Resource moves to this status.
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Resource disappears.
    Gone,
    /// Read fails.
    Error { error: RemoteError },
}

impl ScriptedRead {
    pub fn status(status: &str) -> Self {
        ScriptedRead::Status {
            status: status.to_string(),
            reason: None,
        }
    }

    pub fn failed(status: &str, reason: &str) -> Self {
        ScriptedRead::Status {
            status: status.to_string(),
            reason: Some(reason.to_string()),
        }
    }
}

/// Statuses a resource enters right after a mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionStatuses {
    pub creating: String,
    pub updating: String,
    pub deleting: String,
}

impl TransitionStatuses {
    /// Statuses the mvirt service owning `resource_type` reports.
    pub fn for_type(resource_type: &str) -> Self {
        match resource_type {
            volume::TYPE_NAME => Self {
                updating: "RESIZING".to_string(),
                ..Default::default()
            },
            _ => Self::default(),
        }
    }
}

impl Default for TransitionStatuses {
    fn default() -> Self {
        Self {
            creating: "CREATING".to_string(),
            updating: "UPDATING".to_string(),
            deleting: "DELETING".to_string(),
        }
    }
}

/// Serializable state of a [`MemoryRemote`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSnapshot {
    pub id_prefix: String,
    pub next_id: u64,
    #[serde(default)]
    pub transitions: TransitionStatuses,
    #[serde(default)]
    pub resources: Vec<RemoteResource>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Vec<ScriptedRead>>,
    /// Create request tokens already accepted, mapped to the resource id.
    #[serde(default)]
    pub create_tokens: BTreeMap<String, String>,
}

impl RemoteSnapshot {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    resources: BTreeMap<String, RemoteResource>,
    scripts: HashMap<String, VecDeque<ScriptedRead>>,
    injected: HashMap<CallKind, VecDeque<RemoteError>>,
    create_tokens: HashMap<String, String>,
    delete_tokens: Vec<String>,
    calls: HashMap<CallKind, usize>,
}

impl Inner {
    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, kind: CallKind) -> RemoteResult<()> {
        *self.calls.entry(kind).or_default() += 1;
        match self.injected.get_mut(&kind).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-process [`RemoteClient`].
pub struct MemoryRemote {
    id_prefix: String,
    transitions: TransitionStatuses,
    page_size: usize,
    inner: Mutex<Inner>,
}

impl MemoryRemote {
    pub fn new(id_prefix: &str) -> Self {
        Self {
            id_prefix: id_prefix.to_string(),
            transitions: TransitionStatuses::default(),
            page_size: DEFAULT_PAGE_SIZE,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_transitions(mut self, transitions: TransitionStatuses) -> Self {
        self.transitions = transitions;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn from_snapshot(snapshot: RemoteSnapshot) -> Self {
        let inner = Inner {
            next_id: snapshot.next_id,
            resources: snapshot
                .resources
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect(),
            scripts: snapshot
                .scripts
                .into_iter()
                .map(|(id, reads)| (id, reads.into()))
                .collect(),
            create_tokens: snapshot.create_tokens.into_iter().collect(),
            ..Default::default()
        };
        Self {
            id_prefix: snapshot.id_prefix,
            transitions: snapshot.transitions,
            page_size: DEFAULT_PAGE_SIZE,
            inner: Mutex::new(inner),
        }
    }

    pub async fn snapshot(&self) -> RemoteSnapshot {
        let inner = self.inner.lock().await;
        RemoteSnapshot {
            id_prefix: self.id_prefix.clone(),
            next_id: inner.next_id,
            transitions: self.transitions.clone(),
            resources: inner.resources.values().cloned().collect(),
            scripts: inner
                .scripts
                .iter()
                .filter(|(_, reads)| !reads.is_empty())
                .map(|(id, reads)| (id.clone(), reads.iter().cloned().collect()))
                .collect(),
            create_tokens: inner
                .create_tokens
                .iter()
                .map(|(t, id)| (t.clone(), id.clone()))
                .collect(),
        }
    }

    /// Seed an existing resource.
    pub async fn insert(&self, resource: RemoteResource) {
        let mut inner = self.inner.lock().await;
        inner.resources.insert(resource.id.clone(), resource);
    }

    /// Queue the statuses subsequent reads of `id` observe.
    pub async fn script_reads(&self, id: &str, reads: impl IntoIterator<Item = ScriptedRead>) {
        let mut inner = self.inner.lock().await;
        inner
            .scripts
            .entry(id.to_string())
            .or_default()
            .extend(reads);
    }

    /// Make the next call of `kind` fail with `err`.
    pub async fn fail_next(&self, kind: CallKind, err: RemoteError) {
        let mut inner = self.inner.lock().await;
        inner.injected.entry(kind).or_default().push_back(err);
    }

    pub async fn calls(&self, kind: CallKind) -> usize {
        let inner = self.inner.lock().await;
        inner.calls.get(&kind).copied().unwrap_or(0)
    }

    pub async fn get(&self, id: &str) -> Option<RemoteResource> {
        let inner = self.inner.lock().await;
        inner.resources.get(id).cloned()
    }

    /// Request tokens seen by delete calls, in order.
    pub async fn delete_tokens(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.delete_tokens.clone()
    }
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn create(
        &self,
        desc: &ResourceDescriptor,
        request_token: &str,
    ) -> RemoteResult<RemoteResource> {
        let mut inner = self.inner.lock().await;
        inner.enter(CallKind::Create)?;

        if let Some(id) = inner.create_tokens.get(request_token) {
            if let Some(existing) = inner.resources.get(id) {
                debug!("Create token {} already accepted as {}", request_token, id);
                return Ok(existing.clone());
            }
        }

        if let Some(name) = desc.name.as_deref() {
            let taken = inner
                .resources
                .values()
                .any(|r| r.name.as_deref() == Some(name) && r.parent_id == desc.parent_id);
            if taken {
                return Err(RemoteError::AlreadyExists(name.to_string()));
            }
        }

        inner.next_id += 1;
        let id = format!("{}-{}", self.id_prefix, inner.next_id);
        let now = Utc::now().to_rfc3339();
        let mut properties = desc.properties.clone();
        properties.insert("createdAt".to_string(), Value::String(now.clone()));
        properties.insert("updatedAt".to_string(), Value::String(now));

        let resource = RemoteResource {
            id: id.clone(),
            name: desc.name.clone(),
            parent_id: desc.parent_id.clone(),
            status: self.transitions.creating.clone(),
            status_reason: None,
            properties,
        };
        inner.resources.insert(id.clone(), resource.clone());
        inner
            .create_tokens
            .insert(request_token.to_string(), id.clone());
        debug!("Created {} (token {})", id, request_token);
        Ok(resource)
    }

    async fn update(&self, desc: &ResourceDescriptor) -> RemoteResult<RemoteResource> {
        let mut inner = self.inner.lock().await;
        inner.enter(CallKind::Update)?;

        let id = desc
            .id
            .as_deref()
            .ok_or_else(|| RemoteError::InvalidInput("id is required".to_string()))?;
        let resource = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;

        for (k, v) in &desc.properties {
            resource.properties.insert(k.clone(), v.clone());
        }
        resource.properties.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        resource.status = self.transitions.updating.clone();
        resource.status_reason = None;
        Ok(resource.clone())
    }

    async fn delete(&self, desc: &ResourceDescriptor, request_token: &str) -> RemoteResult<()> {
        let mut inner = self.inner.lock().await;
        inner.enter(CallKind::Delete)?;

        let id = desc
            .id
            .as_deref()
            .ok_or_else(|| RemoteError::InvalidInput("id is required".to_string()))?;
        inner.delete_tokens.push(request_token.to_string());
        let resource = inner
            .resources
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        resource.status = self.transitions.deleting.clone();
        resource.status_reason = None;
        Ok(())
    }

    async fn read(&self, id: &str) -> RemoteResult<RemoteResource> {
        let mut inner = self.inner.lock().await;
        inner.enter(CallKind::Read)?;

        let next = inner.scripts.get_mut(id).and_then(VecDeque::pop_front);
        match next {
            Some(ScriptedRead::Gone) => {
                inner.resources.remove(id);
            }
            Some(ScriptedRead::Error { error }) => return Err(error),
            Some(ScriptedRead::Status { status, reason }) => {
                if let Some(resource) = inner.resources.get_mut(id) {
                    resource.status = status;
                    resource.status_reason = reason;
                }
            }
            None => {}
        }

        inner
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &ListFilter, page_token: Option<&str>) -> RemoteResult<ListPage> {
        let mut inner = self.inner.lock().await;
        inner.enter(CallKind::List)?;

        // Ids are ordered, so the token is simply the last id returned.
        let mut matching = inner
            .resources
            .values()
            .filter(|r| page_token.is_none_or(|after| r.id.as_str() > after))
            .filter(|r| {
                filter
                    .parent_id
                    .as_ref()
                    .is_none_or(|p| r.parent_id.as_ref() == Some(p))
            })
            .filter(|r| {
                filter.name_prefix.as_deref().is_none_or(|prefix| {
                    r.name.as_deref().is_some_and(|n| n.starts_with(prefix))
                })
            });

        let items: Vec<RemoteResource> = matching.by_ref().take(self.page_size).cloned().collect();
        let next_page_token = match matching.next() {
            Some(_) => items.last().map(|r| r.id.clone()),
            None => None,
        };
        Ok(ListPage {
            items,
            next_page_token,
        })
    }
}

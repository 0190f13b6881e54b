//! Orchestrator-facing request and response shapes.

use serde::{Deserialize, Serialize};

use crate::descriptor::ResourceDescriptor;
use crate::engine::{ContinuationState, OperationResult};
use crate::error::{ErrorKind, HandlerError};

/// Handler action requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Update,
    Delete,
    Read,
    List,
}

/// One invocation as sent by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerRequest {
    pub action: Action,
    pub resource_type: String,
    /// Idempotency token for the logical operation. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_request_token: Option<String>,
    /// Desired state; for List, the filter.
    #[serde(default)]
    pub desired_state: ResourceDescriptor,
    /// State returned by the previous invocation of this operation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_state: Option<ContinuationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl HandlerRequest {
    pub fn new(action: Action, resource_type: &str, desired_state: ResourceDescriptor) -> Self {
        Self {
            action,
            resource_type: resource_type.to_string(),
            client_request_token: None,
            desired_state,
            continuation_state: None,
            next_page_token: None,
        }
    }

    /// Request for the next invocation after an in-progress response.
    pub fn resume(&self, response: &HandlerResponse) -> Self {
        let mut next = self.clone();
        if let Some(resource) = &response.resource {
            next.desired_state = resource.clone();
        }
        next.continuation_state = response.continuation_state.clone();
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    InProgress,
    Success,
    Failed,
}

/// Invocation output returned to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerResponse {
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ResourceDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_state: Option<ContinuationState>,
    #[serde(default)]
    pub resume_delay_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl HandlerResponse {
    fn empty(status: OperationStatus) -> Self {
        Self {
            status,
            resource: None,
            resources: Vec::new(),
            continuation_state: None,
            resume_delay_seconds: 0,
            error_kind: None,
            message: None,
            next_page_token: None,
        }
    }

    pub fn failed(err: &HandlerError) -> Self {
        Self {
            error_kind: Some(err.kind()),
            message: Some(err.message().to_string()),
            ..Self::empty(OperationStatus::Failed)
        }
    }

    pub fn listed(resources: Vec<ResourceDescriptor>, next_page_token: Option<String>) -> Self {
        Self {
            resources,
            next_page_token,
            ..Self::empty(OperationStatus::Success)
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OperationStatus::InProgress
    }
}

impl From<OperationResult> for HandlerResponse {
    fn from(result: OperationResult) -> Self {
        match result {
            OperationResult::InProgress {
                descriptor,
                state,
                resume_delay_seconds,
            } => Self {
                resource: Some(descriptor),
                continuation_state: Some(state),
                resume_delay_seconds,
                ..Self::empty(OperationStatus::InProgress)
            },
            OperationResult::Success { descriptor } => Self {
                resource: Some(descriptor),
                ..Self::empty(OperationStatus::Success)
            },
            OperationResult::Failed { kind, message } => Self {
                error_kind: Some(kind),
                message: Some(message),
                ..Self::empty(OperationStatus::Failed)
            },
        }
    }
}

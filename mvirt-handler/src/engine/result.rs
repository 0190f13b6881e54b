//! Operation results returned to the orchestrator.

use super::state::{ContinuationState, Phase};
use crate::descriptor::ResourceDescriptor;
use crate::error::{ErrorKind, HandlerError};

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// Re-invoke with `state` after `resume_delay_seconds`.
    InProgress {
        descriptor: ResourceDescriptor,
        state: ContinuationState,
        resume_delay_seconds: u32,
    },
    Success {
        descriptor: ResourceDescriptor,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl OperationResult {
    pub fn failed(err: HandlerError) -> Self {
        OperationResult::Failed {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationResult::InProgress { .. })
    }

    pub fn phase(&self) -> Phase {
        match self {
            OperationResult::InProgress { state, .. } => state.phase(),
            OperationResult::Success { .. } => Phase::Succeeded,
            OperationResult::Failed { .. } => Phase::Failed,
        }
    }

    pub fn state(&self) -> Option<&ContinuationState> {
        match self {
            OperationResult::InProgress { state, .. } => Some(state),
            _ => None,
        }
    }

    pub fn descriptor(&self) -> Option<&ResourceDescriptor> {
        match self {
            OperationResult::InProgress { descriptor, .. }
            | OperationResult::Success { descriptor } => Some(descriptor),
            OperationResult::Failed { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            OperationResult::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<HandlerError> for OperationResult {
    fn from(err: HandlerError) -> Self {
        OperationResult::failed(err)
    }
}

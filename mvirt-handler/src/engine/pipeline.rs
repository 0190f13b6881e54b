//! Reconciliation pipeline driver.
//!
//! An operation is an ordered list of steps. Each step sees the descriptor
//! and continuation state of the current invocation and either hands over to
//! the next step or ends the invocation.

use async_trait::async_trait;
use tracing::debug;

use super::Operation;
use super::result::OperationResult;
use super::state::ContinuationState;
use crate::audit::HandlerAuditLogger;
use crate::clients::{RemoteClient, RemoteResource};
use crate::config::StabilizationConfig;
use crate::descriptor::ResourceDescriptor;
use crate::error::HandlerError;
use crate::resources::ResourceModel;

/// Collaborators available to every step.
pub struct StepContext<'a> {
    pub operation: Operation,
    pub client: &'a dyn RemoteClient,
    pub model: &'a dyn ResourceModel,
    pub config: &'a StabilizationConfig,
    pub audit: &'a HandlerAuditLogger,
}

/// Values threaded through the steps of one invocation.
#[derive(Debug, Clone)]
pub struct Progress {
    pub descriptor: ResourceDescriptor,
    pub state: ContinuationState,
    /// Converged remote state, left for the read-back step.
    pub observed: Option<RemoteResource>,
}

impl Progress {
    pub fn new(descriptor: ResourceDescriptor, state: ContinuationState) -> Self {
        Self {
            descriptor,
            state,
            observed: None,
        }
    }

    /// Id of the resource this operation acts on.
    ///
    /// The marker wins: it records what the remote actually accepted.
    pub fn resource_id(&self) -> Option<String> {
        self.state
            .mutation_marker
            .as_ref()
            .map(|m| m.resource_id.clone())
            .or_else(|| self.descriptor.id.clone())
    }
}

/// Control flow after a step.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Run the next step.
    Next,
    /// End the invocation; resume after `state.resume_delay_seconds`.
    InProgress,
    Failed(HandlerError),
}

#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow;
}

/// Fixed step list for one operation.
pub struct Pipeline {
    operation: Operation,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run the steps in order until one ends the invocation.
    ///
    /// Falling off the end of the list is success.
    pub async fn run(&self, cx: &StepContext<'_>, mut progress: Progress) -> OperationResult {
        for step in &self.steps {
            let flow = step.run(cx, &mut progress).await;
            debug!(
                "{} {} step {}: {:?}",
                cx.model.type_name(),
                self.operation,
                step.name(),
                flow
            );
            match flow {
                Flow::Next => continue,
                Flow::InProgress => {
                    let resume_delay_seconds = progress.state.resume_delay_seconds;
                    return OperationResult::InProgress {
                        descriptor: progress.descriptor,
                        state: progress.state,
                        resume_delay_seconds,
                    };
                }
                Flow::Failed(err) => return OperationResult::failed(err),
            }
        }
        OperationResult::Success {
            descriptor: progress.descriptor,
        }
    }
}

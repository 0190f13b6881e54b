//! Pipeline steps shared by the operation handlers.

use async_trait::async_trait;
use tracing::{debug, info};

use super::Operation;
use super::state::Phase;
use super::guard::MutationGuard;
use super::pipeline::{Flow, Progress, Step, StepContext};
use super::stabilizer::{Stabilization, StabilizationTarget, Stabilizer};
use crate::error::{HandlerError, RemoteError};

/// Resource-type validation of the desired state.
pub struct Validate;

#[async_trait]
impl Step for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        match cx.model.validate(cx.operation, &progress.descriptor) {
            Ok(()) => Flow::Next,
            Err(e) => Flow::Failed(e),
        }
    }
}

/// Update and delete need to know which resource they act on.
pub struct RequireIdentifier;

#[async_trait]
impl Step for RequireIdentifier {
    fn name(&self) -> &'static str {
        "require-identifier"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        match progress.resource_id() {
            Some(id) => {
                progress.descriptor.id = Some(id);
                Flow::Next
            }
            None => Flow::Failed(HandlerError::InvalidInput(format!(
                "{} id is required for {}",
                cx.model.type_name(),
                cx.operation
            ))),
        }
    }
}

/// Fail a create whose target id already exists.
///
/// Only runs before the first create attempt, and only for types that
/// allow callers to pick ids.
pub struct CheckNotExists;

#[async_trait]
impl Step for CheckNotExists {
    fn name(&self) -> &'static str {
        "check-not-exists"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        if progress.state.has_prior_attempt() || !cx.model.checks_existence_before_create() {
            return Flow::Next;
        }
        let Some(id) = progress.descriptor.id.as_deref() else {
            return Flow::Next;
        };
        match cx.client.read(id).await {
            // A tombstone is not an existing resource.
            Ok(existing) if cx.model.status_table().is_absent(&existing.status) => Flow::Next,
            Ok(existing) => Flow::Failed(HandlerError::AlreadyExists(format!(
                "{} {} already exists ({})",
                cx.model.type_name(),
                existing.id,
                existing.status
            ))),
            Err(RemoteError::NotFound(_)) => Flow::Next,
            Err(e) => Flow::Failed(e.into()),
        }
    }
}

/// Read-before-update: the target must exist and be modifiable.
///
/// Runs once per operation, outside the mutation guard.
pub struct CheckModifiable;

#[async_trait]
impl Step for CheckModifiable {
    fn name(&self) -> &'static str {
        "check-modifiable"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        if progress.state.precondition_checked || !cx.model.requires_update_precondition() {
            return Flow::Next;
        }
        let Some(id) = progress.resource_id() else {
            return Flow::Failed(HandlerError::InvalidInput("id is required".to_string()));
        };
        let current = match cx.client.read(&id).await {
            Ok(current) => current,
            Err(RemoteError::NotFound(_)) => {
                return Flow::Failed(HandlerError::NotFound(format!(
                    "{} {} does not exist",
                    cx.model.type_name(),
                    id
                )));
            }
            Err(e) => return Flow::Failed(e.into()),
        };
        if let Err(e) = cx.model.check_modifiable(&current, &progress.descriptor) {
            return Flow::Failed(e);
        }
        progress.state.precondition_checked = true;
        Flow::Next
    }
}

/// Before the first delete attempt, the resource has to exist.
pub struct CheckExists;

#[async_trait]
impl Step for CheckExists {
    fn name(&self) -> &'static str {
        "check-exists"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        if progress.state.has_prior_attempt() {
            return Flow::Next;
        }
        let Some(id) = progress.resource_id() else {
            return Flow::Failed(HandlerError::InvalidInput("id is required".to_string()));
        };
        let not_found = || {
            Flow::Failed(HandlerError::NotFound(format!(
                "{} {} does not exist",
                cx.model.type_name(),
                id
            )))
        };
        match cx.client.read(&id).await {
            Ok(current) if cx.model.status_table().is_absent(&current.status) => not_found(),
            Ok(_) => Flow::Next,
            Err(RemoteError::NotFound(_)) => not_found(),
            Err(e) => Flow::Failed(e.into()),
        }
    }
}

/// Issue the mutating call unless the guard says it already went through.
pub struct IssueMutation;

#[async_trait]
impl Step for IssueMutation {
    fn name(&self) -> &'static str {
        "issue-mutation"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        if MutationGuard::already_mutated(&progress.state) {
            if progress.descriptor.id.is_none() {
                progress.descriptor.id = progress.resource_id();
            }
            debug!(
                "{} {} already accepted for {}, skipping",
                cx.model.type_name(),
                cx.operation,
                progress.descriptor.display_id()
            );
            return Flow::Next;
        }

        let token = progress.state.next_request_token();
        let accepted_id = match cx.operation {
            Operation::Create => match cx.client.create(&progress.descriptor, &token).await {
                Ok(created) => {
                    cx.model.apply(&mut progress.descriptor, &created);
                    created.id
                }
                Err(e) => return Flow::Failed(e.into()),
            },
            Operation::Update => match cx.client.update(&progress.descriptor).await {
                Ok(updated) => {
                    cx.model.apply(&mut progress.descriptor, &updated);
                    updated.id
                }
                Err(e) => return Flow::Failed(e.into()),
            },
            Operation::Delete => match cx.client.delete(&progress.descriptor, &token).await {
                Ok(()) => progress.descriptor.id.clone().unwrap_or_default(),
                // A previous attempt already removed it; stabilization still
                // has to confirm the absence.
                Err(RemoteError::NotFound(_)) if progress.state.has_prior_attempt() => {
                    let id = progress.descriptor.id.clone().unwrap_or_default();
                    info!(
                        "{} {} already gone after earlier delete attempt",
                        cx.model.type_name(),
                        id
                    );
                    progress.state.record_mutation(&id);
                    return Flow::Next;
                }
                Err(e) => return Flow::Failed(e.into()),
            },
        };

        progress.state.record_mutation(&accepted_id);
        info!(
            "{} {} accepted for {} (token {}, {})",
            cx.model.type_name(),
            cx.operation,
            accepted_id,
            token,
            Phase::MutationIssued
        );
        cx.audit.mutation_issued(
            cx.model.type_name(),
            cx.operation,
            &accepted_id,
            progress.state.mutation_attempts,
        );
        Flow::Next
    }
}

/// One stabilization poll towards `target`.
pub struct Stabilize {
    pub target: StabilizationTarget,
}

#[async_trait]
impl Step for Stabilize {
    fn name(&self) -> &'static str {
        "stabilize"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        let Some(id) = progress.resource_id() else {
            return Flow::Failed(HandlerError::InvalidInput("id is required".to_string()));
        };
        let stabilizer = Stabilizer::new(cx.model, cx.config);
        let outcome = stabilizer
            .poll(
                cx.client,
                cx.operation,
                &id,
                progress.state.clone(),
                self.target,
            )
            .await;

        match outcome {
            Stabilization::InProgress {
                state,
                observed,
                corrective_retry,
            } => {
                if let Some(remote) = observed {
                    cx.model.apply(&mut progress.descriptor, &remote);
                }
                if corrective_retry {
                    cx.audit
                        .corrective_retry(cx.model.type_name(), &id, state.timeout_retry_budget);
                }
                progress.state = state;
                Flow::InProgress
            }
            Stabilization::Converged { observed } => {
                progress.observed = observed;
                Flow::Next
            }
            Stabilization::Failed(e) => Flow::Failed(e),
        }
    }
}

/// Populate the descriptor from the stabilizer's converged read.
pub struct ReadBack;

#[async_trait]
impl Step for ReadBack {
    fn name(&self) -> &'static str {
        "read-back"
    }

    async fn run(&self, cx: &StepContext<'_>, progress: &mut Progress) -> Flow {
        if let Some(remote) = progress.observed.take() {
            cx.model.apply(&mut progress.descriptor, &remote);
        }
        Flow::Next
    }
}

//! Stabilizer - polls a remote resource until it converges.
//!
//! Each call performs exactly one status read and classifies it. Nothing
//! from earlier invocations is trusted: the freshest read decides.
//!
//! Outcomes per read:
//! - converged: target reached (stable success, or gone for deletes)
//! - in progress: transient status, one unit of retry budget consumed
//! - corrective retry: timeout-correctable failure, marker cleared so the
//!   next invocation re-issues the mutating call
//! - failed: non-correctable failure or a budget ran out

use tracing::{debug, warn};

use super::Operation;
use super::classifier::RemoteStatus;
use super::state::ContinuationState;
use crate::clients::{RemoteClient, RemoteResource};
use crate::config::StabilizationConfig;
use crate::error::{HandlerError, RemoteError};
use crate::resources::ResourceModel;

/// What the caller waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizationTarget {
    /// Resource exists in a stable-success status.
    Present,
    /// Resource is gone (not found, or a tombstone status).
    Absent,
}

/// Result of one stabilization poll.
#[derive(Debug, Clone, PartialEq)]
pub enum Stabilization {
    InProgress {
        state: ContinuationState,
        /// Status observed by this poll, if the resource was readable.
        observed: Option<RemoteResource>,
        /// Marker was cleared for a corrective re-issue.
        corrective_retry: bool,
    },
    Converged {
        observed: Option<RemoteResource>,
    },
    Failed(HandlerError),
}

/// Polls one resource using its model's status table and budgets.
pub struct Stabilizer<'a> {
    model: &'a dyn ResourceModel,
    config: &'a StabilizationConfig,
}

impl<'a> Stabilizer<'a> {
    pub fn new(model: &'a dyn ResourceModel, config: &'a StabilizationConfig) -> Self {
        Self { model, config }
    }

    pub async fn poll(
        &self,
        client: &dyn RemoteClient,
        operation: Operation,
        id: &str,
        state: ContinuationState,
        target: StabilizationTarget,
    ) -> Stabilization {
        let read = client.read(id).await;
        self.evaluate(operation, id, state, target, read)
    }

    /// Decide on a single read result.
    pub fn evaluate(
        &self,
        operation: Operation,
        id: &str,
        mut state: ContinuationState,
        target: StabilizationTarget,
        read: Result<RemoteResource, RemoteError>,
    ) -> Stabilization {
        let remote = match (read, target) {
            (Ok(remote), _) => remote,
            (Err(RemoteError::NotFound(_)), StabilizationTarget::Absent) => {
                return self.on_absent(id, state);
            }
            (Err(RemoteError::NotFound(_)), StabilizationTarget::Present) => {
                return Stabilization::Failed(HandlerError::NotFound(format!(
                    "{} {} disappeared during {}",
                    self.model.type_name(),
                    id,
                    operation
                )));
            }
            (Err(e), _) => return Stabilization::Failed(e.into()),
        };

        if target == StabilizationTarget::Absent {
            state.absent_reads = 0;
        }

        let table = self.model.status_table();
        if target == StabilizationTarget::Absent && table.is_absent(&remote.status) {
            return self.on_absent(id, state);
        }

        match table.classify(&remote.status) {
            RemoteStatus::StableSuccess if target == StabilizationTarget::Present => {
                debug!(
                    "{} {} stabilized in {}",
                    self.model.type_name(),
                    id,
                    remote.status
                );
                Stabilization::Converged {
                    observed: Some(remote),
                }
            }
            RemoteStatus::StableFailure => {
                let reason = remote.status_reason.as_deref();
                if self
                    .model
                    .is_timeout_correctable(operation, &remote.status, reason)
                {
                    self.corrective_retry(id, state, remote)
                } else {
                    Stabilization::Failed(HandlerError::NotStabilized(format!(
                        "{} {} failed: {}",
                        self.model.type_name(),
                        id,
                        describe(&remote)
                    )))
                }
            }
            // Transient, or still present while waiting for a delete.
            _ => self.keep_waiting(id, state, Some(remote)),
        }
    }

    fn on_absent(&self, id: &str, mut state: ContinuationState) -> Stabilization {
        state.absent_reads += 1;
        if state.absent_reads >= self.config.absent_confirmations {
            debug!("{} {} is gone", self.model.type_name(), id);
            return Stabilization::Converged { observed: None };
        }
        debug!(
            "{} {} not found ({}/{} confirmations)",
            self.model.type_name(),
            id,
            state.absent_reads,
            self.config.absent_confirmations
        );
        self.keep_waiting(id, state, None)
    }

    fn keep_waiting(
        &self,
        id: &str,
        mut state: ContinuationState,
        observed: Option<RemoteResource>,
    ) -> Stabilization {
        state.retry_budget = state.retry_budget.saturating_sub(1);
        if state.retry_budget == 0 {
            let last = match &observed {
                Some(remote) => describe(remote),
                None => "not found".to_string(),
            };
            warn!(
                "{} {} did not stabilize, retry budget exhausted (last status {})",
                self.model.type_name(),
                id,
                last
            );
            return Stabilization::Failed(HandlerError::NotStabilized(format!(
                "{} {} did not stabilize within {} polls; last status {}",
                self.model.type_name(),
                id,
                self.config.max_retry_budget,
                last
            )));
        }

        state.resume_delay_seconds = self.config.poll_delay_seconds;
        Stabilization::InProgress {
            state,
            observed,
            corrective_retry: false,
        }
    }

    fn corrective_retry(
        &self,
        id: &str,
        mut state: ContinuationState,
        remote: RemoteResource,
    ) -> Stabilization {
        if state.timeout_retry_budget == 0 {
            return Stabilization::Failed(HandlerError::NotStabilized(format!(
                "{} {} failed after {} corrective retries: {}",
                self.model.type_name(),
                id,
                self.config.max_timeout_retries,
                describe(&remote)
            )));
        }

        state.timeout_retry_budget -= 1;
        state.mutation_marker = None;
        state.timeout_retry_pending = true;
        state.resume_delay_seconds = self.config.poll_delay_seconds;
        warn!(
            "{} {} hit a timeout ({}), re-issuing ({} corrective retries left)",
            self.model.type_name(),
            id,
            describe(&remote),
            state.timeout_retry_budget
        );
        Stabilization::InProgress {
            state,
            observed: Some(remote),
            corrective_retry: true,
        }
    }
}

fn describe(remote: &RemoteResource) -> String {
    match &remote.status_reason {
        Some(reason) => format!("{} ({})", remote.status, reason),
        None => remote.status.clone(),
    }
}

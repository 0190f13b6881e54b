//! Continuation state threaded through the invocations of one operation.

use serde::{Deserialize, Serialize};

use crate::config::StabilizationConfig;

/// Record that the mutating call of an attempt was accepted by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationMarker {
    /// Id of the resource the call acted on (assigned by the remote on create).
    pub resource_id: String,
    /// Token sent with the accepted call.
    pub request_token: String,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Lifecycle phase of a create, update or delete.
///
/// [`ContinuationState::phase`] derives `NotStarted`, `Stabilizing` and
/// `TimeoutRetry`. `MutationIssued` lasts only from the accepted call to the
/// poll in the same invocation, so a returned state never carries it. The
/// terminal phases come from the operation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    MutationIssued,
    Stabilizing,
    TimeoutRetry,
    Succeeded,
    Failed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::NotStarted => "NOT_STARTED",
            Phase::MutationIssued => "MUTATION_ISSUED",
            Phase::Stabilizing => "STABILIZING",
            Phase::TimeoutRetry => "TIMEOUT_RETRY",
            Phase::Succeeded => "SUCCEEDED",
            Phase::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Engine-owned state handed back to the orchestrator between invocations.
///
/// Invariants:
/// - `mutation_marker` is set once per attempt and cleared only by a
///   timeout-correctable retry.
/// - `retry_budget` and `timeout_retry_budget` never increase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationState {
    pub retry_budget: u32,
    pub timeout_retry_budget: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_marker: Option<MutationMarker>,
    pub resume_delay_seconds: u32,
    /// Base idempotency token of the logical operation.
    pub client_request_token: String,
    /// Mutating calls accepted so far, across corrective retries.
    #[serde(default)]
    pub mutation_attempts: u32,
    /// Set while a corrective re-issue is outstanding.
    #[serde(default)]
    pub timeout_retry_pending: bool,
    #[serde(default)]
    pub precondition_checked: bool,
    /// Consecutive not-found reads while waiting for a delete.
    #[serde(default)]
    pub absent_reads: u32,
}

impl ContinuationState {
    /// Fresh state with budgets at their configured maximums.
    pub fn fresh(config: &StabilizationConfig, client_request_token: impl Into<String>) -> Self {
        Self {
            retry_budget: config.max_retry_budget,
            timeout_retry_budget: config.max_timeout_retries,
            mutation_marker: None,
            resume_delay_seconds: 0,
            client_request_token: client_request_token.into(),
            mutation_attempts: 0,
            timeout_retry_pending: false,
            precondition_checked: false,
            absent_reads: 0,
        }
    }

    /// Token for the next mutating attempt.
    ///
    /// Each attempt gets its own token so the remote does not deduplicate a
    /// deliberate re-issue against the attempt that timed out.
    pub fn next_request_token(&self) -> String {
        format!("{}-{}", self.client_request_token, self.mutation_attempts + 1)
    }

    /// Record an accepted mutating call.
    pub fn record_mutation(&mut self, resource_id: &str) {
        let request_token = self.next_request_token();
        self.mutation_attempts += 1;
        self.mutation_marker = Some(MutationMarker {
            resource_id: resource_id.to_string(),
            request_token,
            attempt: self.mutation_attempts,
        });
        self.timeout_retry_pending = false;
    }

    /// Whether any mutating call was accepted for this operation, including
    /// attempts whose marker a corrective retry has since cleared.
    pub fn has_prior_attempt(&self) -> bool {
        self.mutation_attempts > 0 || self.mutation_marker.is_some()
    }

    pub fn phase(&self) -> Phase {
        match (&self.mutation_marker, self.timeout_retry_pending) {
            (Some(_), _) => Phase::Stabilizing,
            (None, true) => Phase::TimeoutRetry,
            (None, false) => Phase::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StabilizationConfig {
        StabilizationConfig {
            max_retry_budget: 5,
            max_timeout_retries: 2,
            poll_delay_seconds: 10,
            absent_confirmations: 1,
        }
    }

    #[test]
    fn test_fresh_state_starts_at_maximums() {
        let state = ContinuationState::fresh(&config(), "tok");
        assert_eq!(state.retry_budget, 5);
        assert_eq!(state.timeout_retry_budget, 2);
        assert!(state.mutation_marker.is_none());
        assert_eq!(state.phase(), Phase::NotStarted);
    }

    #[test]
    fn test_record_mutation_sets_marker_with_attempt_token() {
        let mut state = ContinuationState::fresh(&config(), "tok");
        assert_eq!(state.next_request_token(), "tok-1");

        state.record_mutation("vm-1");

        let marker = state.mutation_marker.as_ref().unwrap();
        assert_eq!(marker.resource_id, "vm-1");
        assert_eq!(marker.request_token, "tok-1");
        assert_eq!(marker.attempt, 1);
        assert_eq!(state.next_request_token(), "tok-2");
        assert_eq!(state.phase(), Phase::Stabilizing);
        assert!(state.has_prior_attempt());
    }

    #[test]
    fn test_recorded_mutation_resumes_as_stabilizing() {
        let mut state = ContinuationState::fresh(&config(), "tok");
        state.record_mutation("vm-1");
        assert_eq!(state.phase(), Phase::Stabilizing);
        assert_ne!(state.phase(), Phase::MutationIssued);
        assert_eq!(Phase::MutationIssued.to_string(), "MUTATION_ISSUED");
    }

    #[test]
    fn test_cleared_marker_with_pending_flag_is_timeout_retry() {
        let mut state = ContinuationState::fresh(&config(), "tok");
        state.record_mutation("vm-1");
        state.mutation_marker = None;
        state.timeout_retry_pending = true;

        assert_eq!(state.phase(), Phase::TimeoutRetry);
        assert!(state.has_prior_attempt());

        state.record_mutation("vm-1");
        assert!(!state.timeout_retry_pending);
        assert_eq!(state.mutation_marker.unwrap().request_token, "tok-2");
    }

    #[test]
    fn test_state_round_trips_as_camel_case_json() {
        let mut state = ContinuationState::fresh(&config(), "tok");
        state.record_mutation("r-1");

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["retryBudget"], 5);
        assert_eq!(value["mutationMarker"]["resourceId"], "r-1");

        let back: ContinuationState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }
}

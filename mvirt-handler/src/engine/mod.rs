//! Reconciliation engine.
//!
//! Drives a create, update or delete of a remote resource to a stable state
//! across repeated, stateless invocations. All progress lives in the
//! [`ContinuationState`] handed back to the orchestrator.

pub mod classifier;
pub mod guard;
pub mod pipeline;
pub mod result;
pub mod stabilizer;
pub mod state;
pub mod steps;

pub use classifier::{RemoteStatus, StatusTable};
pub use guard::MutationGuard;
pub use pipeline::{Flow, Pipeline, Progress, Step, StepContext};
pub use result::OperationResult;
pub use stabilizer::{Stabilization, StabilizationTarget, Stabilizer};
pub use state::{ContinuationState, MutationMarker, Phase};

/// Mutating operations the engine drives to stability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        };
        f.write_str(s)
    }
}

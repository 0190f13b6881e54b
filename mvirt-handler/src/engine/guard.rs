//! Mutation guard.

use super::state::ContinuationState;

/// Decides whether the mutating call of the current attempt already went
/// through.
///
/// The marker in the continuation state is the only signal. A replayed
/// invocation carrying a marker must go straight to stabilization.
pub struct MutationGuard;

impl MutationGuard {
    pub fn already_mutated(state: &ContinuationState) -> bool {
        state.mutation_marker.is_some()
    }
}

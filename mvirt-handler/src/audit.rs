use tracing::info;

use crate::engine::Operation;
use crate::error::ErrorKind;

/// Handler audit logger.
///
/// Audit events go to the `audit` tracing target so a subscriber can route
/// them separately from diagnostic logs.
#[derive(Debug, Clone)]
pub struct HandlerAuditLogger {
    component: &'static str,
    enabled: bool,
}

impl HandlerAuditLogger {
    pub fn new(component: &'static str) -> Self {
        Self {
            component,
            enabled: true,
        }
    }

    pub fn new_noop() -> Self {
        Self {
            component: "noop",
            enabled: false,
        }
    }

    fn log(&self, message: String, object_ids: Vec<String>) {
        if !self.enabled {
            return;
        }
        info!(
            target: "audit",
            component = self.component,
            object_ids = ?object_ids,
            "{}",
            message
        );
    }

    // Mutations
    pub fn mutation_issued(&self, resource_type: &str, operation: Operation, id: &str, attempt: u32) {
        self.log(
            format!(
                "{} {} accepted: {} (attempt {})",
                resource_type, operation, id, attempt
            ),
            vec![id.to_string()],
        );
    }

    pub fn corrective_retry(&self, resource_type: &str, id: &str, retries_left: u32) {
        self.log(
            format!(
                "{} {} timed out remotely, scheduling re-issue ({} left)",
                resource_type, id, retries_left
            ),
            vec![id.to_string()],
        );
    }

    // Terminal results
    pub fn operation_succeeded(&self, resource_type: &str, operation: Operation, id: &str) {
        self.log(
            format!("{} {} succeeded: {}", resource_type, operation, id),
            vec![id.to_string()],
        );
    }

    pub fn operation_failed(
        &self,
        resource_type: &str,
        operation: Operation,
        id: &str,
        kind: ErrorKind,
        message: &str,
    ) {
        self.log(
            format!(
                "{} {} failed: {} ({}: {})",
                resource_type, operation, id, kind, message
            ),
            vec![id.to_string()],
        );
    }
}

impl Default for HandlerAuditLogger {
    fn default() -> Self {
        Self::new("mvirt-handler")
    }
}

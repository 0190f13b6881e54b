//! VM deployments managed by mvirt-vmm.

use crate::clients::RemoteResource;
use crate::config::StabilizationConfig;
use crate::descriptor::ResourceDescriptor;
use crate::engine::{Operation, StatusTable};
use crate::error::{HandlerError, Result};

use super::ResourceModel;

pub const TYPE_NAME: &str = "vm";

/// Failure reason code mvirt-vmm reports when a deployment exceeded its
/// internal deadline.
pub const DEPLOYMENT_TIMEOUT: &str = "DEPLOYMENT_TIMEOUT";

const MIN_MEMORY_MB: u64 = 128;

const STATUS_TABLE: StatusTable = StatusTable {
    stable_success: &["RUNNING", "STOPPED"],
    stable_failure: &["CREATE_FAILED", "UPDATE_FAILED", "DELETE_FAILED"],
    absent: &["DELETED"],
};

pub struct VmModel;

impl ResourceModel for VmModel {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn status_table(&self) -> StatusTable {
        STATUS_TABLE
    }

    fn default_config(&self) -> StabilizationConfig {
        StabilizationConfig {
            max_retry_budget: 120,
            max_timeout_retries: 3,
            poll_delay_seconds: 10,
            absent_confirmations: 1,
        }
    }

    fn is_timeout_correctable(
        &self,
        operation: Operation,
        status: &str,
        reason: Option<&str>,
    ) -> bool {
        operation == Operation::Delete
            && status == "DELETE_FAILED"
            && reason.is_some_and(|r| r.contains(DEPLOYMENT_TIMEOUT))
    }

    fn validate(&self, operation: Operation, desc: &ResourceDescriptor) -> Result<()> {
        if operation == Operation::Delete {
            return Ok(());
        }
        if desc.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
            return Err(HandlerError::InvalidInput("VM name is required".to_string()));
        }
        match desc.u64_property("cpuCores") {
            Some(n) if n >= 1 => {}
            _ => {
                return Err(HandlerError::InvalidInput(
                    "cpuCores must be at least 1".to_string(),
                ));
            }
        }
        match desc.u64_property("memoryMb") {
            Some(n) if n >= MIN_MEMORY_MB => {}
            _ => {
                return Err(HandlerError::InvalidInput(format!(
                    "memoryMb must be at least {}",
                    MIN_MEMORY_MB
                )));
            }
        }
        Ok(())
    }

    fn requires_update_precondition(&self) -> bool {
        true
    }

    fn check_modifiable(&self, current: &RemoteResource, _desired: &ResourceDescriptor) -> Result<()> {
        match current.status.as_str() {
            "RUNNING" | "STOPPED" => Ok(()),
            other => Err(HandlerError::Conflict(format!(
                "VM {} is {} and cannot be modified",
                current.id, other
            ))),
        }
    }
}

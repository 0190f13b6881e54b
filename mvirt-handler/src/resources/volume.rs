//! ZFS volumes managed by mvirt-zfs.

use crate::clients::RemoteResource;
use crate::config::StabilizationConfig;
use crate::descriptor::ResourceDescriptor;
use crate::engine::{Operation, StatusTable};
use crate::error::{HandlerError, Result};

use super::ResourceModel;

pub const TYPE_NAME: &str = "volume";

const STATUS_TABLE: StatusTable = StatusTable {
    stable_success: &["AVAILABLE", "IN_USE"],
    stable_failure: &["ERROR"],
    absent: &["DELETED"],
};

pub struct VolumeModel;

impl ResourceModel for VolumeModel {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn status_table(&self) -> StatusTable {
        STATUS_TABLE
    }

    fn default_config(&self) -> StabilizationConfig {
        StabilizationConfig {
            max_retry_budget: 60,
            max_timeout_retries: 0,
            poll_delay_seconds: 5,
            absent_confirmations: 1,
        }
    }

    fn validate(&self, operation: Operation, desc: &ResourceDescriptor) -> Result<()> {
        match operation {
            Operation::Create => {
                if desc.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
                    return Err(HandlerError::InvalidInput(
                        "Volume name is required".to_string(),
                    ));
                }
                if desc.parent_id.is_none() {
                    return Err(HandlerError::InvalidInput(
                        "Volume project (parentId) is required".to_string(),
                    ));
                }
                require_size(desc)?;
            }
            Operation::Update => {
                require_size(desc)?;
            }
            Operation::Delete => {}
        }
        Ok(())
    }

    fn requires_update_precondition(&self) -> bool {
        true
    }

    /// Volumes can only grow, and not while being deleted or broken.
    fn check_modifiable(&self, current: &RemoteResource, desired: &ResourceDescriptor) -> Result<()> {
        if matches!(current.status.as_str(), "DELETING" | "ERROR") {
            return Err(HandlerError::Conflict(format!(
                "Volume {} is {}",
                current.id, current.status
            )));
        }
        let current_size = current
            .properties
            .get("sizeBytes")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let desired_size = desired.u64_property("sizeBytes").unwrap_or(0);
        if desired_size < current_size {
            return Err(HandlerError::InvalidInput(format!(
                "Volume {} cannot shrink from {} to {} bytes",
                current.id, current_size, desired_size
            )));
        }
        Ok(())
    }

    fn checks_existence_before_create(&self) -> bool {
        true
    }
}

fn require_size(desc: &ResourceDescriptor) -> Result<()> {
    match desc.u64_property("sizeBytes") {
        Some(n) if n > 0 => Ok(()),
        _ => Err(HandlerError::InvalidInput(
            "sizeBytes must be greater than zero".to_string(),
        )),
    }
}

//! Resource types the handlers know how to drive.
//!
//! A [`ResourceModel`] carries everything type-specific: the status table,
//! validation, update preconditions and default budgets. The engine itself
//! never looks at a raw status except through the model.

pub mod vm;
pub mod volume;

use std::sync::Arc;

use crate::clients::RemoteResource;
use crate::config::StabilizationConfig;
use crate::descriptor::ResourceDescriptor;
use crate::engine::{Operation, StatusTable};
use crate::error::Result;

pub use vm::VmModel;
pub use volume::VolumeModel;

/// Type-specific behavior of a managed resource.
pub trait ResourceModel: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn status_table(&self) -> StatusTable;

    fn default_config(&self) -> StabilizationConfig;

    /// Whether a failed status is known to be fixed by re-issuing the
    /// mutating call, e.g. a deployment that ran into an internal deadline.
    fn is_timeout_correctable(
        &self,
        _operation: Operation,
        _status: &str,
        _reason: Option<&str>,
    ) -> bool {
        false
    }

    /// Validate the desired state before anything touches the remote.
    fn validate(&self, _operation: Operation, _desc: &ResourceDescriptor) -> Result<()> {
        Ok(())
    }

    /// Whether updates read the resource first and check it can be modified.
    fn requires_update_precondition(&self) -> bool {
        false
    }

    /// Precondition for an update, given the current remote state.
    fn check_modifiable(&self, _current: &RemoteResource, _desired: &ResourceDescriptor) -> Result<()> {
        Ok(())
    }

    /// Whether a create carrying an id first checks that it does not exist.
    fn checks_existence_before_create(&self) -> bool {
        false
    }

    /// Fold a remote read into the descriptor returned to the orchestrator.
    fn apply(&self, desc: &mut ResourceDescriptor, remote: &RemoteResource) {
        desc.merge_remote(remote);
    }
}

/// Look up a built-in resource model by type name.
pub fn model_for(type_name: &str) -> Option<Arc<dyn ResourceModel>> {
    match type_name {
        vm::TYPE_NAME => Some(Arc::new(VmModel)),
        volume::TYPE_NAME => Some(Arc::new(VolumeModel)),
        _ => None,
    }
}

/// Names of the built-in resource types.
pub fn type_names() -> [&'static str; 2] {
    [vm::TYPE_NAME, volume::TYPE_NAME]
}

//! mvirt-handler: resource lifecycle handlers for mvirt.
//!
//! An orchestrator invokes a handler repeatedly. Each invocation does a
//! bounded amount of work (at most one mutating call and one status poll)
//! and returns either a terminal result or a continuation state plus a
//! resume delay. The handler never sleeps; the orchestrator owns the loop.

pub mod audit;
pub mod clients;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod resources;

pub use audit::HandlerAuditLogger;
pub use clients::{ListFilter, ListPage, MemoryRemote, RemoteClient, RemoteResource};
pub use config::{HandlerConfig, StabilizationConfig};
pub use descriptor::ResourceDescriptor;
pub use engine::{ContinuationState, MutationMarker, Operation, OperationResult, Phase};
pub use error::{ErrorKind, HandlerError, RemoteError};
pub use handler::{HandlerRegistry, ListOutput, ResourceHandler};
pub use protocol::{Action, HandlerRequest, HandlerResponse, OperationStatus};
pub use resources::{ResourceModel, model_for};

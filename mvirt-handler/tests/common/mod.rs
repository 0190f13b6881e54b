//! Test helpers for mvirt-handler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use mvirt_handler::clients::memory::TransitionStatuses;
use mvirt_handler::resources::{VmModel, VolumeModel};
use mvirt_handler::{
    Action, HandlerAuditLogger, HandlerRequest, HandlerResponse, MemoryRemote, ResourceDescriptor,
    ResourceHandler, ResourceModel, StabilizationConfig,
};

/// A handler wired to an in-memory remote.
pub struct Harness {
    pub remote: Arc<MemoryRemote>,
    pub handler: ResourceHandler,
}

impl Harness {
    pub fn new(model: Arc<dyn ResourceModel>, id_prefix: &str, config: StabilizationConfig) -> Self {
        let transitions = TransitionStatuses::for_type(model.type_name());
        let remote = Arc::new(MemoryRemote::new(id_prefix).with_transitions(transitions));
        let handler = ResourceHandler::new(model, remote.clone(), config)
            .with_audit(HandlerAuditLogger::new_noop());
        Self { remote, handler }
    }

    pub fn vm(config: StabilizationConfig) -> Self {
        Self::new(Arc::new(VmModel), "vm", config)
    }

    pub fn volume(config: StabilizationConfig) -> Self {
        Self::new(Arc::new(VolumeModel), "r", config)
    }

    /// One invocation, with the response passed through its JSON form the
    /// way the orchestrator stores it.
    pub async fn invoke(&self, request: HandlerRequest) -> HandlerResponse {
        let response = self.handler.invoke(request).await;
        let wire = serde_json::to_string(&response).unwrap();
        serde_json::from_str(&wire).unwrap()
    }

    /// Play the orchestrator: re-invoke with the returned continuation state
    /// until a terminal response, or `max` invocations.
    pub async fn drive(&self, first: HandlerRequest, max: usize) -> Vec<HandlerResponse> {
        let mut responses = Vec::new();
        let mut request = first;
        for _ in 0..max {
            let response = self.invoke(request.clone()).await;
            let terminal = response.is_terminal();
            request = request.resume(&response);
            responses.push(response);
            if terminal {
                break;
            }
        }
        responses
    }
}

pub fn config(max_retry_budget: u32, max_timeout_retries: u32) -> StabilizationConfig {
    StabilizationConfig {
        max_retry_budget,
        max_timeout_retries,
        poll_delay_seconds: 10,
        absent_confirmations: 1,
    }
}

pub fn request(action: Action, resource_type: &str, desired: ResourceDescriptor) -> HandlerRequest {
    let mut request = HandlerRequest::new(action, resource_type, desired);
    request.client_request_token = Some("tok".to_string());
    request
}

pub fn web_vm() -> ResourceDescriptor {
    ResourceDescriptor::named("web")
        .with_property("cpuCores", 2u64)
        .with_property("memoryMb", 2048u64)
}

pub fn data_volume(size: u64) -> ResourceDescriptor {
    ResourceDescriptor::named("data")
        .with_parent("proj-1")
        .with_property("sizeBytes", size)
}

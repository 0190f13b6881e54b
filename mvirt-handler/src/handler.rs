//! Operation handlers.
//!
//! A [`ResourceHandler`] binds one resource model to its remote client and
//! budgets. Create, update and delete run a fixed pipeline through the
//! engine; read and list are single remote calls.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::HandlerAuditLogger;
use crate::clients::{ListFilter, RemoteClient};
use crate::config::StabilizationConfig;
use crate::descriptor::ResourceDescriptor;
use crate::engine::steps::{
    CheckExists, CheckModifiable, CheckNotExists, IssueMutation, ReadBack, RequireIdentifier,
    Stabilize, Validate,
};
use crate::engine::{
    ContinuationState, Operation, OperationResult, Pipeline, Progress, StabilizationTarget,
    StepContext,
};
use crate::error::{HandlerError, Result};
use crate::protocol::{Action, HandlerRequest, HandlerResponse};
use crate::resources::ResourceModel;

/// Step list for a mutating operation.
pub fn pipeline_for(operation: Operation) -> Pipeline {
    match operation {
        Operation::Create => Pipeline::new(Operation::Create)
            .step(Validate)
            .step(CheckNotExists)
            .step(IssueMutation)
            .step(Stabilize {
                target: StabilizationTarget::Present,
            })
            .step(ReadBack),
        Operation::Update => Pipeline::new(Operation::Update)
            .step(RequireIdentifier)
            .step(Validate)
            .step(CheckModifiable)
            .step(IssueMutation)
            .step(Stabilize {
                target: StabilizationTarget::Present,
            })
            .step(ReadBack),
        Operation::Delete => Pipeline::new(Operation::Delete)
            .step(RequireIdentifier)
            .step(Validate)
            .step(CheckExists)
            .step(IssueMutation)
            .step(Stabilize {
                target: StabilizationTarget::Absent,
            }),
    }
}

/// Page of a list call, mapped to descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct ListOutput {
    pub resources: Vec<ResourceDescriptor>,
    pub next_page_token: Option<String>,
}

/// Lifecycle handler for one resource type.
pub struct ResourceHandler {
    model: Arc<dyn ResourceModel>,
    client: Arc<dyn RemoteClient>,
    config: StabilizationConfig,
    audit: HandlerAuditLogger,
}

impl ResourceHandler {
    pub fn new(
        model: Arc<dyn ResourceModel>,
        client: Arc<dyn RemoteClient>,
        config: StabilizationConfig,
    ) -> Self {
        Self {
            model,
            client,
            config,
            audit: HandlerAuditLogger::default(),
        }
    }

    /// Handler using the model's default budgets.
    pub fn with_defaults(model: Arc<dyn ResourceModel>, client: Arc<dyn RemoteClient>) -> Self {
        let config = model.default_config();
        Self::new(model, client, config)
    }

    pub fn with_audit(mut self, audit: HandlerAuditLogger) -> Self {
        self.audit = audit;
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.model.type_name()
    }

    pub fn config(&self) -> &StabilizationConfig {
        &self.config
    }

    pub async fn create(
        &self,
        desired: ResourceDescriptor,
        state: Option<ContinuationState>,
        client_request_token: Option<&str>,
    ) -> OperationResult {
        self.drive(Operation::Create, desired, state, client_request_token)
            .await
    }

    pub async fn update(
        &self,
        desired: ResourceDescriptor,
        state: Option<ContinuationState>,
        client_request_token: Option<&str>,
    ) -> OperationResult {
        self.drive(Operation::Update, desired, state, client_request_token)
            .await
    }

    pub async fn delete(
        &self,
        desired: ResourceDescriptor,
        state: Option<ContinuationState>,
        client_request_token: Option<&str>,
    ) -> OperationResult {
        self.drive(Operation::Delete, desired, state, client_request_token)
            .await
    }

    /// Single read; no continuation state.
    pub async fn read(&self, desc: &ResourceDescriptor) -> OperationResult {
        let Some(id) = desc.id.as_deref() else {
            return OperationResult::failed(HandlerError::InvalidInput(format!(
                "{} id is required for read",
                self.type_name()
            )));
        };
        match self.client.read(id).await {
            Ok(remote) if self.model.status_table().is_absent(&remote.status) => {
                OperationResult::failed(HandlerError::NotFound(format!(
                    "{} {} was deleted",
                    self.type_name(),
                    id
                )))
            }
            Ok(remote) => {
                let mut descriptor = desc.clone();
                self.model.apply(&mut descriptor, &remote);
                OperationResult::Success { descriptor }
            }
            Err(e) => OperationResult::failed(e.into()),
        }
    }

    /// Single list call; the page token is passed through untouched.
    pub async fn list(&self, filter: &ListFilter, page_token: Option<&str>) -> Result<ListOutput> {
        let page = self.client.list(filter, page_token).await?;
        let table = self.model.status_table();
        let resources = page
            .items
            .iter()
            .filter(|r| !table.is_absent(&r.status))
            .map(|r| {
                let mut desc = ResourceDescriptor::default();
                self.model.apply(&mut desc, r);
                desc
            })
            .collect();
        Ok(ListOutput {
            resources,
            next_page_token: page.next_page_token,
        })
    }

    /// Dispatch an orchestrator request.
    pub async fn invoke(&self, request: HandlerRequest) -> HandlerResponse {
        if request.resource_type != self.type_name() {
            return HandlerResponse::failed(&HandlerError::InvalidInput(format!(
                "handler for {} cannot serve resource type {}",
                self.type_name(),
                request.resource_type
            )));
        }

        let token = request.client_request_token.as_deref();
        match request.action {
            Action::Create => self
                .create(request.desired_state, request.continuation_state, token)
                .await
                .into(),
            Action::Update => self
                .update(request.desired_state, request.continuation_state, token)
                .await
                .into(),
            Action::Delete => self
                .delete(request.desired_state, request.continuation_state, token)
                .await
                .into(),
            Action::Read => self.read(&request.desired_state).await.into(),
            Action::List => {
                let filter = ListFilter::from(&request.desired_state);
                match self
                    .list(&filter, request.next_page_token.as_deref())
                    .await
                {
                    Ok(out) => HandlerResponse::listed(out.resources, out.next_page_token),
                    Err(e) => HandlerResponse::failed(&e),
                }
            }
        }
    }

    async fn drive(
        &self,
        operation: Operation,
        desired: ResourceDescriptor,
        state: Option<ContinuationState>,
        client_request_token: Option<&str>,
    ) -> OperationResult {
        let state = match state {
            Some(state) => state,
            None => {
                let token = client_request_token
                    .map(String::from)
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                ContinuationState::fresh(&self.config, token)
            }
        };

        info!(
            "{} {} of {} ({}, retry budget {}, timeout retries {})",
            self.type_name(),
            operation,
            desired.display_id(),
            state.phase(),
            state.retry_budget,
            state.timeout_retry_budget
        );

        let cx = StepContext {
            operation,
            client: self.client.as_ref(),
            model: self.model.as_ref(),
            config: &self.config,
            audit: &self.audit,
        };
        let fallback_id = desired.display_id().to_string();
        let result = pipeline_for(operation)
            .run(&cx, Progress::new(desired, state))
            .await;

        match &result {
            OperationResult::Success { descriptor } => {
                info!(
                    "{} {} of {} {}",
                    self.type_name(),
                    operation,
                    descriptor.display_id(),
                    result.phase()
                );
                self.audit
                    .operation_succeeded(self.type_name(), operation, descriptor.display_id());
            }
            OperationResult::Failed { kind, message } => {
                warn!(
                    "{} {} of {} {}: {}: {}",
                    self.type_name(),
                    operation,
                    fallback_id,
                    result.phase(),
                    kind,
                    message
                );
                self.audit
                    .operation_failed(self.type_name(), operation, &fallback_id, *kind, message);
            }
            OperationResult::InProgress {
                resume_delay_seconds,
                ..
            } => {
                debug!(
                    "{} {} of {} {}, resume in {}s",
                    self.type_name(),
                    operation,
                    fallback_id,
                    result.phase(),
                    resume_delay_seconds
                );
            }
        }
        result
    }
}

/// Handlers keyed by resource type name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, ResourceHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: ResourceHandler) {
        self.handlers.insert(handler.type_name(), handler);
    }

    pub fn get(&self, resource_type: &str) -> Option<&ResourceHandler> {
        self.handlers.get(resource_type)
    }

    pub async fn invoke(&self, request: HandlerRequest) -> HandlerResponse {
        match self.handlers.get(request.resource_type.as_str()) {
            Some(handler) => handler.invoke(request).await,
            None => HandlerResponse::failed(&HandlerError::InvalidInput(format!(
                "unknown resource type: {}",
                request.resource_type
            ))),
        }
    }
}

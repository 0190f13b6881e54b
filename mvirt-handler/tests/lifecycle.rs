//! Lifecycle tests: whole operations driven through repeated invocations,
//! the way the orchestrator runs them.

mod common;

use mvirt_handler::clients::memory::{CallKind, ScriptedRead};
use mvirt_handler::resources::vm::DEPLOYMENT_TIMEOUT;
use mvirt_handler::{
    Action, ContinuationState, ErrorKind, OperationStatus, RemoteClient, RemoteError,
    ResourceDescriptor,
};

use common::{Harness, config, data_volume, request, web_vm};

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn test_create_volume_converges_on_second_invocation() {
    let h = Harness::volume(config(60, 0));
    h.remote
        .script_reads(
            "r-1",
            [
                ScriptedRead::status("CREATING"),
                ScriptedRead::status("AVAILABLE"),
            ],
        )
        .await;

    let responses = h
        .drive(request(Action::Create, "volume", data_volume(1 << 30)), 10)
        .await;

    assert_eq!(responses.len(), 2);
    let first = &responses[0];
    assert_eq!(first.status, OperationStatus::InProgress);
    assert_eq!(first.resume_delay_seconds, 10);
    let state = first.continuation_state.as_ref().unwrap();
    assert_eq!(state.retry_budget, 59);
    assert_eq!(state.mutation_marker.as_ref().unwrap().resource_id, "r-1");

    let last = &responses[1];
    assert_eq!(last.status, OperationStatus::Success);
    let resource = last.resource.as_ref().unwrap();
    assert_eq!(resource.id.as_deref(), Some("r-1"));
    assert_eq!(resource.status.as_deref(), Some("AVAILABLE"));
    assert!(last.continuation_state.is_none());

    assert_eq!(h.remote.calls(CallKind::Create).await, 1);
}

#[tokio::test]
async fn test_invocations_are_transient_reads_plus_one() {
    for transient in [0usize, 1, 4] {
        let h = Harness::vm(config(20, 0));
        let mut reads = vec![ScriptedRead::status("CREATING"); transient];
        reads.push(ScriptedRead::status("RUNNING"));
        h.remote.script_reads("vm-1", reads).await;

        let responses = h.drive(request(Action::Create, "vm", web_vm()), 50).await;

        assert_eq!(responses.len(), transient + 1, "transient reads: {}", transient);
        assert_eq!(responses.last().unwrap().status, OperationStatus::Success);
        assert_eq!(h.remote.calls(CallKind::Create).await, 1);
        assert_eq!(h.remote.calls(CallKind::Read).await, transient + 1);
    }
}

#[tokio::test]
async fn test_replayed_state_does_not_mutate_again() {
    let h = Harness::vm(config(10, 0));
    let first = h.invoke(request(Action::Create, "vm", web_vm())).await;
    assert_eq!(first.status, OperationStatus::InProgress);

    let replay = request(Action::Create, "vm", web_vm()).resume(&first);
    let a = h.invoke(replay.clone()).await;
    let b = h.invoke(replay).await;

    assert_eq!(a.continuation_state, b.continuation_state);
    assert_eq!(a.status, OperationStatus::InProgress);
    assert_eq!(h.remote.calls(CallKind::Create).await, 1);
}

#[tokio::test]
async fn test_replayed_update_state_does_not_update_again() {
    let h = Harness::volume(config(60, 0));
    let created = h.remote.create(&data_volume(1024), "seed").await.unwrap();
    h.remote
        .script_reads(&created.id, [ScriptedRead::status("AVAILABLE")])
        .await;

    let desired = ResourceDescriptor::default()
        .with_id(created.id.clone())
        .with_property("sizeBytes", 2048u64);
    let first_request = request(Action::Update, "volume", desired);
    let first = h.invoke(first_request.clone()).await;
    assert_eq!(first.status, OperationStatus::InProgress);

    let replay = first_request.resume(&first);
    let a = h.invoke(replay.clone()).await;
    let b = h.invoke(replay).await;

    assert_eq!(a.continuation_state, b.continuation_state);
    assert_eq!(a.status, OperationStatus::InProgress);
    assert_eq!(h.remote.calls(CallKind::Update).await, 1);
}

#[tokio::test]
async fn test_replayed_delete_state_does_not_delete_again() {
    let h = Harness::vm(config(10, 1));
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(&created.id, [ScriptedRead::status("RUNNING")])
        .await;

    let first_request = request(
        Action::Delete,
        "vm",
        ResourceDescriptor::default().with_id(created.id.clone()),
    );
    let first = h.invoke(first_request.clone()).await;
    assert_eq!(first.status, OperationStatus::InProgress);

    let replay = first_request.resume(&first);
    let a = h.invoke(replay.clone()).await;
    let b = h.invoke(replay).await;

    assert_eq!(a.continuation_state, b.continuation_state);
    assert_eq!(a.status, OperationStatus::InProgress);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 1);
}

#[tokio::test]
async fn test_create_fails_once_retry_budget_is_spent() {
    let h = Harness::vm(config(3, 0));

    // No scripted reads: the VM stays CREATING forever.
    let responses = h.drive(request(Action::Create, "vm", web_vm()), 10).await;

    assert_eq!(responses.len(), 3);
    let budgets: Vec<u32> = responses
        .iter()
        .filter_map(|r| r.continuation_state.as_ref())
        .map(|s| s.retry_budget)
        .collect();
    assert_eq!(budgets, vec![2, 1]);

    let last = responses.last().unwrap();
    assert_eq!(last.status, OperationStatus::Failed);
    assert_eq!(last.error_kind, Some(ErrorKind::NotStabilized));
    assert!(last.message.as_deref().unwrap().contains("CREATING"));
    assert_eq!(h.remote.calls(CallKind::Create).await, 1);
}

#[tokio::test]
async fn test_create_failure_status_is_not_retried() {
    let h = Harness::vm(config(10, 3));
    h.remote
        .script_reads("vm-1", [ScriptedRead::failed("CREATE_FAILED", DEPLOYMENT_TIMEOUT)])
        .await;

    let responses = h.drive(request(Action::Create, "vm", web_vm()), 10).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].error_kind, Some(ErrorKind::NotStabilized));
    assert_eq!(h.remote.calls(CallKind::Create).await, 1);
}

#[tokio::test]
async fn test_create_read_error_is_surfaced() {
    let h = Harness::vm(config(10, 0));
    h.remote
        .fail_next(CallKind::Read, RemoteError::Throttled("slow down".into()))
        .await;

    let responses = h.drive(request(Action::Create, "vm", web_vm()), 10).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(
        responses[0].error_kind,
        Some(ErrorKind::InternalServiceError)
    );
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_volume_resize_waits_for_resizing_to_settle() {
    let h = Harness::volume(config(60, 0));
    let created = h.remote.create(&data_volume(1024), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("AVAILABLE"),
                ScriptedRead::status("RESIZING"),
                ScriptedRead::status("AVAILABLE"),
            ],
        )
        .await;

    let desired = ResourceDescriptor::default()
        .with_id(created.id.clone())
        .with_property("sizeBytes", 2048u64);
    let responses = h.drive(request(Action::Update, "volume", desired), 10).await;

    assert_eq!(responses.len(), 2);
    assert_eq!(
        responses[0].resource.as_ref().unwrap().status.as_deref(),
        Some("RESIZING")
    );
    let last = responses[1].resource.as_ref().unwrap();
    assert_eq!(last.status.as_deref(), Some("AVAILABLE"));
    assert_eq!(last.u64_property("sizeBytes"), Some(2048));
    assert_eq!(h.remote.calls(CallKind::Update).await, 1);
}

#[tokio::test]
async fn test_volume_shrink_is_rejected_before_update() {
    let h = Harness::volume(config(60, 0));
    let created = h.remote.create(&data_volume(4096), "seed").await.unwrap();
    h.remote
        .script_reads(&created.id, [ScriptedRead::status("AVAILABLE")])
        .await;

    let desired = ResourceDescriptor::default()
        .with_id(created.id)
        .with_property("sizeBytes", 1024u64);
    let response = h.invoke(request(Action::Update, "volume", desired)).await;

    assert_eq!(response.error_kind, Some(ErrorKind::InvalidInput));
    assert_eq!(h.remote.calls(CallKind::Update).await, 0);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_of_missing_vm_is_not_found() {
    let h = Harness::vm(config(10, 1));

    let response = h
        .invoke(request(
            Action::Delete,
            "vm",
            ResourceDescriptor::default().with_id("vm-404"),
        ))
        .await;

    assert_eq!(response.status, OperationStatus::Failed);
    assert_eq!(response.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(h.remote.calls(CallKind::Delete).await, 0);
}

#[tokio::test]
async fn test_resumed_delete_treats_not_found_as_success() {
    let h = Harness::vm(config(10, 1));
    let mut state = ContinuationState::fresh(&config(10, 1), "tok");
    state.record_mutation("vm-404");

    let mut resumed = request(
        Action::Delete,
        "vm",
        ResourceDescriptor::default().with_id("vm-404"),
    );
    resumed.continuation_state = Some(state);
    let response = h.invoke(resumed).await;

    assert_eq!(response.status, OperationStatus::Success);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 0);
    assert_eq!(h.remote.calls(CallKind::Read).await, 1);
}

#[tokio::test]
async fn test_delete_reissues_after_deployment_timeout() {
    let h = Harness::vm(config(10, 1));
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("RUNNING"),
                ScriptedRead::failed("DELETE_FAILED", "DEPLOYMENT_TIMEOUT: deadline exceeded"),
                ScriptedRead::status("DELETING"),
                ScriptedRead::Gone,
            ],
        )
        .await;

    let desired = ResourceDescriptor::default().with_id(created.id.clone());
    let responses = h.drive(request(Action::Delete, "vm", desired), 10).await;

    assert_eq!(responses.len(), 3);

    let retry = responses[0].continuation_state.as_ref().unwrap();
    assert!(retry.mutation_marker.is_none());
    assert!(retry.timeout_retry_pending);
    assert_eq!(retry.timeout_retry_budget, 0);
    assert_eq!(retry.retry_budget, 10);

    let reissued = responses[1].continuation_state.as_ref().unwrap();
    assert_eq!(reissued.mutation_marker.as_ref().unwrap().attempt, 2);
    assert!(!reissued.timeout_retry_pending);

    assert_eq!(responses[2].status, OperationStatus::Success);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 2);
    assert_eq!(h.remote.delete_tokens().await, vec!["tok-1", "tok-2"]);
    assert!(h.remote.get(&created.id).await.is_none());
}

#[tokio::test]
async fn test_delete_timeout_without_budget_fails() {
    let h = Harness::vm(config(10, 0));
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("STOPPED"),
                ScriptedRead::failed("DELETE_FAILED", DEPLOYMENT_TIMEOUT),
            ],
        )
        .await;

    let desired = ResourceDescriptor::default().with_id(created.id);
    let responses = h.drive(request(Action::Delete, "vm", desired), 10).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].error_kind, Some(ErrorKind::NotStabilized));
    assert_eq!(h.remote.calls(CallKind::Delete).await, 1);
}

#[tokio::test]
async fn test_reissued_delete_of_vanished_vm_succeeds() {
    let h = Harness::vm(config(10, 1));
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("RUNNING"),
                ScriptedRead::failed("DELETE_FAILED", DEPLOYMENT_TIMEOUT),
                ScriptedRead::Gone,
            ],
        )
        .await;

    let first_request = request(
        Action::Delete,
        "vm",
        ResourceDescriptor::default().with_id(created.id.clone()),
    );
    let first = h.invoke(first_request.clone()).await;
    assert!(first.continuation_state.as_ref().unwrap().timeout_retry_pending);

    h.remote
        .fail_next(CallKind::Delete, RemoteError::NotFound(created.id.clone()))
        .await;
    let second = h.invoke(first_request.resume(&first)).await;

    assert_eq!(second.status, OperationStatus::Success);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 2);
    assert_eq!(h.remote.calls(CallKind::Read).await, 3);
}

#[tokio::test]
async fn test_reissued_delete_of_vanished_vm_waits_for_confirmations() {
    let mut cfg = config(10, 1);
    cfg.absent_confirmations = 3;
    let h = Harness::vm(cfg);
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("RUNNING"),
                ScriptedRead::failed("DELETE_FAILED", DEPLOYMENT_TIMEOUT),
                ScriptedRead::Gone,
            ],
        )
        .await;

    let first_request = request(
        Action::Delete,
        "vm",
        ResourceDescriptor::default().with_id(created.id.clone()),
    );
    let first = h.invoke(first_request.clone()).await;
    assert_eq!(first.status, OperationStatus::InProgress);

    h.remote
        .fail_next(CallKind::Delete, RemoteError::NotFound(created.id.clone()))
        .await;
    let rest = h.drive(first_request.resume(&first), 10).await;

    // Three not-found reads, one per invocation.
    assert_eq!(rest.len(), 3);
    let confirming: Vec<u32> = rest
        .iter()
        .filter_map(|r| r.continuation_state.as_ref())
        .map(|s| s.absent_reads)
        .collect();
    assert_eq!(confirming, vec![1, 2]);
    assert!(
        rest[0]
            .continuation_state
            .as_ref()
            .unwrap()
            .mutation_marker
            .is_some()
    );
    assert_eq!(rest[2].status, OperationStatus::Success);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 2);
}

#[tokio::test]
async fn test_delete_waits_for_absent_confirmations() {
    let mut cfg = config(10, 0);
    cfg.absent_confirmations = 2;
    let h = Harness::vm(cfg);
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(&created.id, [ScriptedRead::status("RUNNING"), ScriptedRead::Gone])
        .await;

    let desired = ResourceDescriptor::default().with_id(created.id);
    let responses = h.drive(request(Action::Delete, "vm", desired), 10).await;

    assert_eq!(responses.len(), 2);
    let waiting = responses[0].continuation_state.as_ref().unwrap();
    assert_eq!(waiting.absent_reads, 1);
    assert_eq!(waiting.retry_budget, 9);
    assert_eq!(responses[1].status, OperationStatus::Success);
}

// =============================================================================
// Budgets
// =============================================================================

#[tokio::test]
async fn test_budgets_never_increase() {
    let h = Harness::vm(config(20, 2));
    let created = h.remote.create(&web_vm(), "seed").await.unwrap();
    h.remote
        .script_reads(
            &created.id,
            [
                ScriptedRead::status("RUNNING"),
                ScriptedRead::status("DELETING"),
                ScriptedRead::failed("DELETE_FAILED", DEPLOYMENT_TIMEOUT),
                ScriptedRead::status("DELETING"),
                ScriptedRead::failed("DELETE_FAILED", DEPLOYMENT_TIMEOUT),
                ScriptedRead::status("DELETING"),
                ScriptedRead::status("DELETING"),
                ScriptedRead::Gone,
            ],
        )
        .await;

    let desired = ResourceDescriptor::default().with_id(created.id);
    let responses = h.drive(request(Action::Delete, "vm", desired), 50).await;
    assert_eq!(responses.last().unwrap().status, OperationStatus::Success);

    let states: Vec<&ContinuationState> = responses
        .iter()
        .filter_map(|r| r.continuation_state.as_ref())
        .collect();
    assert!(states.len() >= 2);
    for pair in states.windows(2) {
        assert!(pair[1].retry_budget <= pair[0].retry_budget);
        assert!(pair[1].timeout_retry_budget <= pair[0].timeout_retry_budget);
    }
    assert_eq!(states.last().unwrap().timeout_retry_budget, 0);
    assert_eq!(h.remote.calls(CallKind::Delete).await, 3);
}

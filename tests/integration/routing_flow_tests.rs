use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use agent_vault::adapters::{ActionReceipt, AdapterFuture, ServiceAction, ServiceAdapter};
use agent_vault::claim::{ClaimOutcome, ClaimProtocol};
use agent_vault::config::ResilienceConfig;
use agent_vault::journal::{EventType, Journal};
use agent_vault::router::{Disposition, Router, TaskKind};
use agent_vault::store::{read_task, Stage, TaskStore};
use agent_vault::{AgentMode, AppError};

use super::test_helpers::{put, vault, MemoryJournal};

#[derive(Clone, Copy)]
enum Reply {
    Accept,
    Unavailable,
    Reject,
}

struct FakeAdapter {
    reply: Reply,
    calls: AtomicU32,
}

impl FakeAdapter {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ServiceAdapter for FakeAdapter {
    fn execute<'a>(&'a self, action: &'a ServiceAction) -> AdapterFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Accept => Ok(ActionReceipt {
                    reference: Some(format!("ref-{}", action.service().key())),
                    simulated: false,
                }),
                Reply::Unavailable => Err(AppError::Transient("503 from upstream".into())),
                Reply::Reject => Err(AppError::Data("recipient rejected".into())),
            }
        })
    }
}

const APPROVED_EMAIL: &str = "---\ntype: local_draft_email\naction: send_email\nto: jane@example.com\nsubject: Re: Quarterly numbers\n---\n\n## Drafted Reply\n\nFigures attached.\n";

fn strict_resilience() -> ResilienceConfig {
    ResilienceConfig {
        max_attempts: 1,
        base_delay_ms: 0,
        failure_threshold: 1,
        recovery_timeout_seconds: 3600,
        ..ResilienceConfig::default()
    }
}

fn router(
    store: &TaskStore,
    journal: &Arc<MemoryJournal>,
    adapter: &Arc<FakeAdapter>,
    mode: AgentMode,
) -> Router {
    Router::new(
        store.clone(),
        Arc::clone(journal) as Arc<dyn Journal>,
        Arc::clone(adapter) as Arc<dyn ServiceAdapter>,
        strict_resilience(),
        mode,
        mode.as_str(),
    )
}

fn status_in(store: &TaskStore, stage: &Stage, name: &str) -> Option<String> {
    read_task(&store.path_of(stage, name))
        .ok()
        .and_then(|t| t.header.get("status").map(str::to_owned))
}

#[tokio::test]
async fn approved_email_is_sent_and_archived() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);

    let outcome = router.route_decided(&Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md").await.unwrap();
    assert_eq!(outcome.kind, TaskKind::Email);
    assert_eq!(
        outcome.disposition,
        Disposition::Executed(ActionReceipt {
            reference: Some("ref-mail".into()),
            simulated: false,
        })
    );
    assert_eq!(adapter.calls(), 1);
    assert_eq!(
        status_in(&store, &Stage::Done, "LOCAL_DRAFT_EMAIL_1.md").as_deref(),
        Some("executed")
    );
    assert!(!store.path_of(&Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md").exists());

    let executed: Vec<_> = journal
        .entries()
        .into_iter()
        .filter(|e| e.event_type == EventType::ActionExecuted)
        .collect();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].details["reference"], "ref-mail");
}

#[tokio::test]
async fn open_circuit_defers_and_leaves_the_file() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Unavailable);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_2.md", APPROVED_EMAIL);

    let first = router.route_decided(&Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md").await.unwrap();
    assert!(matches!(
        first.disposition,
        Disposition::Failed { ref reason } if reason.contains("503")
    ));
    let status = status_in(&store, &Stage::Done, "LOCAL_DRAFT_EMAIL_1.md").unwrap();
    assert!(status.starts_with("failed: "), "{status}");

    let second = router.route_decided(&Stage::Approved, "LOCAL_DRAFT_EMAIL_2.md").await.unwrap();
    assert!(matches!(second.disposition, Disposition::Deferred { .. }));
    assert!(!second.is_success());
    assert!(store.path_of(&Stage::Approved, "LOCAL_DRAFT_EMAIL_2.md").is_file());
    assert_eq!(adapter.calls(), 1);
    assert_eq!(journal.count(EventType::ActionFailed), 1);
    assert_eq!(journal.count(EventType::ActionDeferred), 1);
}

#[tokio::test]
async fn rejected_payload_is_archived_as_data_error() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Reject);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_2.md", APPROVED_EMAIL);

    for name in ["LOCAL_DRAFT_EMAIL_1.md", "LOCAL_DRAFT_EMAIL_2.md"] {
        let outcome = router.route_decided(&Stage::Approved, name).await.unwrap();
        assert!(matches!(outcome.disposition, Disposition::Failed { .. }));
        let status = status_in(&store, &Stage::Done, name).unwrap();
        assert!(status.starts_with("error: "), "{status}");
    }
    // Data errors leave the circuit closed, so both calls went out.
    assert_eq!(adapter.calls(), 2);
    assert_eq!(journal.count(EventType::DataError), 2);
}

#[tokio::test]
async fn approved_task_missing_fields_never_reaches_the_adapter() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    let text = "---\ntype: email\nsubject: hi\n---\nno recipient\n";
    put(&store, &Stage::Approved, "EMAIL_9.md", text);

    let outcome = router.route_decided(&Stage::Approved, "EMAIL_9.md").await.unwrap();
    assert!(matches!(
        outcome.disposition,
        Disposition::Failed { ref reason } if reason.contains("recipient")
    ));
    assert_eq!(adapter.calls(), 0);
    let status = status_in(&store, &Stage::Done, "EMAIL_9.md").unwrap();
    assert!(status.contains("missing required field"));
}

#[tokio::test]
async fn unknown_action_becomes_a_manual_notice() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    let text = "---\naction: unknown_widget\n---\nDo the widget thing.\n";
    put(&store, &Stage::Approved, "TASK_7.md", text);

    let outcome = router.route_decided(&Stage::Approved, "TASK_7.md").await.unwrap();
    let Disposition::NoticeWritten { notice } = outcome.disposition else {
        panic!("expected a notice, got {:?}", outcome.disposition);
    };
    assert!(notice.starts_with("NEEDS_MANUAL_ACTION_"));
    let written = read_task(&store.path_of(&Stage::NeedsAction, &notice)).unwrap();
    assert_eq!(written.header.get("source_file"), Some("TASK_7.md"));
    assert_eq!(written.header.get("action"), Some("unknown_widget"));
    assert!(written.body.contains("Do the widget thing."));

    assert_eq!(
        status_in(&store, &Stage::Done, "TASK_7.md").as_deref(),
        Some("manual_action_required")
    );
    assert_eq!(adapter.calls(), 0);
    assert_eq!(journal.count(EventType::ManualActionRequired), 1);
}

#[tokio::test]
async fn rejected_task_is_archived_without_side_effects() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    put(&store, &Stage::Rejected, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);

    let outcome = router.route_decided(&Stage::Rejected, "LOCAL_DRAFT_EMAIL_1.md").await.unwrap();
    assert_eq!(outcome.disposition, Disposition::Acknowledged);
    assert_eq!(
        status_in(&store, &Stage::Done, "LOCAL_DRAFT_EMAIL_1.md").as_deref(),
        Some("rejected")
    );
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn sweep_handles_approved_and_rejected() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);
    put(&store, &Stage::Rejected, "LOCAL_DRAFT_EMAIL_2.md", APPROVED_EMAIL);

    let outcomes = router.sweep().await.unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert!(store.list(&Stage::Approved, "*.md").unwrap().is_empty());
    assert!(store.list(&Stage::Rejected, "*.md").unwrap().is_empty());
    assert_eq!(store.list(&Stage::Done, "*.md").unwrap().len(), 2);
}

#[tokio::test]
async fn cloud_router_never_touches_decided_tasks() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Cloud);
    put(&store, &Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md", APPROVED_EMAIL);

    assert!(router.sweep().await.unwrap().is_empty());
    let outcome = router.route_decided(&Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md").await.unwrap();
    assert_eq!(outcome.disposition, Disposition::Left);
    assert!(store.path_of(&Stage::Approved, "LOCAL_DRAFT_EMAIL_1.md").is_file());
    assert_eq!(adapter.calls(), 0);
}

#[tokio::test]
async fn claimed_email_is_drafted_for_approval() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Cloud);
    let protocol =
        ClaimProtocol::new(store.clone(), "cloud", Arc::clone(&journal) as Arc<dyn Journal>);
    put(
        &store,
        &Stage::NeedsAction,
        "EMAIL_1.md",
        "---\ntype: email\nfrom: Jane <jane@example.com>\nsubject: Numbers\n---\nSend them please.\n",
    );

    let ClaimOutcome::Claimed(task) = protocol.claim("EMAIL_1.md").unwrap() else {
        panic!("claim failed");
    };
    let outcome = router.route_claimed(&protocol, &task).await.unwrap();
    let Disposition::Drafted { draft } = outcome.disposition else {
        panic!("expected a draft, got {:?}", outcome.disposition);
    };
    assert!(draft.starts_with("CLOUD_DRAFT_EMAIL_"));
    let written = read_task(&store.path_of(&Stage::PendingApproval, &draft)).unwrap();
    assert_eq!(written.header.get("to"), Some("jane@example.com"));

    let archived = read_task(&store.path_of(&Stage::Done, "EMAIL_1.md")).unwrap();
    assert_eq!(archived.header.get("status"), Some("drafted"));
    assert_eq!(archived.header.get("processed_by"), Some("cloud"));
    assert_eq!(adapter.calls(), 0);
    assert_eq!(journal.count(EventType::DraftCreated), 1);
}

#[tokio::test]
async fn claimed_email_without_sender_is_archived_with_error() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    let protocol =
        ClaimProtocol::new(store.clone(), "local", Arc::clone(&journal) as Arc<dyn Journal>);
    put(&store, &Stage::NeedsAction, "EMAIL_2.md", "---\ntype: email\n---\nanonymous\n");

    let ClaimOutcome::Claimed(task) = protocol.claim("EMAIL_2.md").unwrap() else {
        panic!("claim failed");
    };
    let outcome = router.route_claimed(&protocol, &task).await.unwrap();
    assert!(matches!(outcome.disposition, Disposition::Failed { .. }));
    let status = status_in(&store, &Stage::Done, "EMAIL_2.md").unwrap();
    assert!(status.starts_with("error: "));
    assert!(store.list(&Stage::PendingApproval, "*.md").unwrap().is_empty());
}

#[tokio::test]
async fn cloud_releases_content_refused_tasks() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Cloud);
    let protocol =
        ClaimProtocol::new(store.clone(), "cloud", Arc::clone(&journal) as Arc<dyn Journal>);
    put(&store, &Stage::NeedsAction, "TASK_3.md", "---\naction: process_payment\n---\n");

    let ClaimOutcome::Claimed(task) = protocol.claim("TASK_3.md").unwrap() else {
        panic!("claim failed");
    };
    let outcome = router.route_claimed(&protocol, &task).await.unwrap();
    assert!(matches!(outcome.disposition, Disposition::Refused { .. }));
    assert!(store.path_of(&Stage::NeedsAction, "TASK_3.md").is_file());
    assert_eq!(journal.count(EventType::ClaimRefused), 1);
    assert_eq!(journal.count(EventType::TaskReleased), 1);
}

#[tokio::test]
async fn unreadable_approved_file_is_archived_as_invalid() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    std::fs::write(store.path_of(&Stage::Approved, "EMAIL_bad.md"), b"---\n\xff\xfe\n").unwrap();

    let outcomes = router.sweep().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].disposition, Disposition::Failed { .. }));
    assert!(!store.path_of(&Stage::Approved, "EMAIL_bad.md").exists());
    assert!(store.path_of(&Stage::Done, "EMAIL_bad_INVALID.md").is_file());
    assert_eq!(journal.count(EventType::DataError), 1);
    assert_eq!(adapter.calls(), 0);

    // Nothing left to trip over on the next sweep.
    assert!(router.sweep().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_claimed_file_is_archived_not_released() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let adapter = FakeAdapter::new(Reply::Accept);
    let mut router = router(&store, &journal, &adapter, AgentMode::Local);
    let protocol =
        ClaimProtocol::new(store.clone(), "local", Arc::clone(&journal) as Arc<dyn Journal>);
    std::fs::write(store.path_of(&Stage::NeedsAction, "EMAIL_4.md"), b"\xff\xfe\xfd").unwrap();

    let ClaimOutcome::Claimed(task) = protocol.claim("EMAIL_4.md").unwrap() else {
        panic!("claim failed");
    };
    let outcome = router.route_claimed(&protocol, &task).await.unwrap();
    assert!(matches!(outcome.disposition, Disposition::Failed { .. }));
    assert!(!store.path_of(&Stage::NeedsAction, "EMAIL_4.md").exists());
    assert!(!task.path.exists());
    assert!(store.path_of(&Stage::Done, "EMAIL_4_INVALID.md").is_file());
    assert_eq!(journal.count(EventType::TaskReleased), 0);
    assert_eq!(journal.count(EventType::DataError), 1);
}

use std::sync::{Arc, Barrier};
use std::thread;

use agent_vault::claim::{ClaimOutcome, ClaimProtocol};
use agent_vault::journal::{EventType, Journal};
use agent_vault::store::{Stage, TaskStore};

use super::test_helpers::{put, MemoryJournal};

const CONTENDERS: usize = 8;

fn contended_vault() -> (tempfile::TempDir, TaskStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = TaskStore::new(dir.path().to_path_buf(), false);
    let agents: Vec<String> = (0..CONTENDERS).map(|i| format!("agent{i}")).collect();
    let agents: Vec<&str> = agents.iter().map(String::as_str).collect();
    store.ensure_layout(&agents).expect("layout");
    (dir, store)
}

#[test]
fn exactly_one_agent_wins_each_task() {
    let (_dir, store) = contended_vault();
    let journal = MemoryJournal::shared();
    let names: Vec<String> = (0..20).map(|i| format!("EMAIL_{i:02}.md")).collect();
    for name in &names {
        put(&store, &Stage::NeedsAction, name, "---\ntype: email\n---\nhello\n");
    }

    let barrier = Arc::new(Barrier::new(CONTENDERS));
    let handles: Vec<_> = (0..CONTENDERS)
        .map(|i| {
            let protocol = ClaimProtocol::new(
                store.clone(),
                format!("agent{i}"),
                Arc::clone(&journal) as Arc<dyn Journal>,
            );
            let barrier = Arc::clone(&barrier);
            let names = names.clone();
            thread::spawn(move || {
                barrier.wait();
                names
                    .iter()
                    .filter(|name| matches!(protocol.claim(name), Ok(ClaimOutcome::Claimed(_))))
                    .count()
            })
        })
        .collect();

    let won: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(won, names.len());
    assert!(store.list(&Stage::NeedsAction, "*.md").unwrap().is_empty());
    assert_eq!(journal.count(EventType::TaskClaimed), names.len());

    for name in &names {
        let holders = (0..CONTENDERS)
            .filter(|i| store.path_of(&Stage::InProgress(format!("agent{i}")), name).is_file())
            .count();
        assert_eq!(holders, 1, "{name} held by {holders} agents");
    }
}

#[test]
fn released_task_can_be_claimed_by_the_other_agent() {
    let (_dir, store) = contended_vault();
    let journal = MemoryJournal::shared();
    put(&store, &Stage::NeedsAction, "WHATSAPP_1.md", "---\ntype: whatsapp\n---\n");

    let shared = Arc::clone(&journal) as Arc<dyn Journal>;
    let cloud = ClaimProtocol::new(store.clone(), "agent0", Arc::clone(&shared));
    let local = ClaimProtocol::new(store.clone(), "agent1", shared);

    let ClaimOutcome::Claimed(task) = cloud.claim("WHATSAPP_1.md").unwrap() else {
        panic!("first claim should win");
    };
    assert!(!local.claim("WHATSAPP_1.md").unwrap().is_claimed());

    cloud.release(&task, "outside work zone").unwrap();
    let ClaimOutcome::Claimed(task) = local.claim("WHATSAPP_1.md").unwrap() else {
        panic!("claim after release should win");
    };
    assert_eq!(task.agent, "agent1");
    let done = local.complete(&task).unwrap();
    assert!(done.is_file());
    assert_eq!(journal.count(EventType::TaskReleased), 1);
}

use std::fs;

use agent_vault::journal::EventType;
use agent_vault::store::{read_task, SeenIds, Stage};
use agent_vault::watchers::inbox::priority_for;
use agent_vault::watchers::{poll_once, seen_path, InboxWatcher};

use super::test_helpers::{vault, MemoryJournal};

#[tokio::test]
async fn dropped_files_become_tasks_once() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    fs::write(store.inbox_dir().join("urgent-contract.pdf"), b"%PDF-1.4").unwrap();
    fs::write(store.inbox_dir().join("notes.txt"), b"hello").unwrap();
    fs::write(store.inbox_dir().join(".DS_Store"), b"").unwrap();

    let mut watcher = InboxWatcher::new(store.inbox_dir());
    let mut seen = SeenIds::load(seen_path(&store, "inbox"), 100, false);

    let created = poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert_eq!(created, 2);
    let tasks = store.list(&Stage::NeedsAction, "FILE_*.md").unwrap();
    assert_eq!(tasks.len(), 2);

    let created = poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert_eq!(created, 0);
    assert_eq!(journal.count(EventType::TaskCreated), 2);

    let priorities: Vec<String> = tasks
        .iter()
        .map(|name| {
            let task = read_task(&store.path_of(&Stage::NeedsAction, name)).unwrap();
            assert_eq!(task.header.get("type"), Some("file_drop"));
            format!(
                "{}={}",
                task.header.get("original_name").unwrap(),
                task.header.get("priority").unwrap()
            )
        })
        .collect();
    assert!(priorities.contains(&"urgent-contract.pdf=P0".to_owned()));
    assert!(priorities.contains(&"notes.txt=P3".to_owned()));
}

#[tokio::test]
async fn seen_ids_survive_a_restart() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    fs::write(store.inbox_dir().join("report.csv"), b"a,b\n").unwrap();

    let mut watcher = InboxWatcher::new(store.inbox_dir());
    let mut seen = SeenIds::load(seen_path(&store, "inbox"), 100, false);
    poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert!(seen_path(&store, "inbox").is_file());

    let mut reloaded = SeenIds::load(seen_path(&store, "inbox"), 100, false);
    let created = poll_once(&mut watcher, &store, &mut reloaded, journal.as_ref()).await.unwrap();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn changed_file_is_a_new_event() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let path = store.inbox_dir().join("invoice.pdf");
    fs::write(&path, b"v1").unwrap();

    let mut watcher = InboxWatcher::new(store.inbox_dir());
    let mut seen = SeenIds::load(seen_path(&store, "inbox"), 100, false);
    poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();

    fs::write(&path, b"version two").unwrap();
    let created = poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert_eq!(created, 1);
}

#[tokio::test]
async fn missing_inbox_polls_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = agent_vault::store::TaskStore::new(dir.path().to_path_buf(), false);
    let journal = MemoryJournal::shared();
    let mut watcher = InboxWatcher::new(dir.path().join("Inbox"));
    let mut seen = SeenIds::load(dir.path().join("seen.json"), 10, false);
    let created = poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert_eq!(created, 0);
}

#[tokio::test]
async fn more_files_than_the_seen_limit_are_created_once() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(store.inbox_dir().join(name), name.as_bytes()).unwrap();
    }

    let mut watcher = InboxWatcher::new(store.inbox_dir());
    let mut seen = SeenIds::load(seen_path(&store, "inbox"), 2, false);
    let mut per_poll = Vec::new();
    for _ in 0..4 {
        per_poll.push(poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap());
    }
    assert_eq!(per_poll, vec![3, 0, 0, 0]);

    // A restarted watcher reloads every id, not just the newest two.
    let mut reloaded = SeenIds::load(seen_path(&store, "inbox"), 2, false);
    let created = poll_once(&mut watcher, &store, &mut reloaded, journal.as_ref()).await.unwrap();
    assert_eq!(created, 0);
    assert_eq!(store.list(&Stage::NeedsAction, "FILE_*.md").unwrap().len(), 3);
}

#[tokio::test]
async fn removed_inbox_files_are_forgotten() {
    let (_dir, store) = vault();
    let journal = MemoryJournal::shared();
    let path = store.inbox_dir().join("scan.pdf");
    fs::write(&path, b"scan").unwrap();

    let mut watcher = InboxWatcher::new(store.inbox_dir());
    let mut seen = SeenIds::load(seen_path(&store, "inbox"), 10, false);
    poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert_eq!(seen.len(), 1);

    fs::remove_file(&path).unwrap();
    poll_once(&mut watcher, &store, &mut seen, journal.as_ref()).await.unwrap();
    assert!(seen.is_empty());
}

#[test]
fn priority_follows_filename_keywords() {
    assert_eq!(priority_for("ASAP_quote.docx"), "P0");
    assert_eq!(priority_for("payment-schedule.xlsx"), "P1");
    assert_eq!(priority_for("weekly_report.md"), "P2");
    assert_eq!(priority_for("photo.jpg"), "P3");
}

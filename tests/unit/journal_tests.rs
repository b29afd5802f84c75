use std::fs;

use agent_vault::journal::{DailyJsonJournal, EventType, Journal, JournalEntry};
use chrono::Utc;

#[test]
fn entries_append_to_the_day_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = DailyJsonJournal::new(dir.path().join("Logs"), false).unwrap();

    journal
        .record(
            JournalEntry::new(EventType::TaskClaimed, "local")
                .with_file("EMAIL_1.md")
                .with_agent("local"),
        )
        .unwrap();
    journal
        .record(JournalEntry::new(EventType::ActionFailed, "local").with_reason("smtp down"))
        .unwrap();

    let today = Utc::now().date_naive();
    let entries = journal.read_day(today).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["event_type"], "task_claimed");
    assert_eq!(entries[0]["file"], "EMAIL_1.md");
    assert_eq!(entries[0]["actor"], "local");
    assert_eq!(entries[1]["reason"], "smtp down");

    let path = journal.path_for(today);
    assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("{today}.json"));
    let raw = fs::read_to_string(path).unwrap();
    assert!(serde_json::from_str::<Vec<serde_json::Value>>(&raw).is_ok());
}

#[test]
fn missing_day_reads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = DailyJsonJournal::new(dir.path().to_path_buf(), false).unwrap();
    let entries = journal.read_day(Utc::now().date_naive()).unwrap();
    assert!(entries.is_empty());
}

#[test]
fn corrupt_day_file_is_moved_aside() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = DailyJsonJournal::new(dir.path().to_path_buf(), false).unwrap();
    let path = journal.path_for(Utc::now().date_naive());
    fs::write(&path, "{ not an array").unwrap();

    assert!(journal.read_day(Utc::now().date_naive()).is_err());
    journal
        .record(JournalEntry::new(EventType::SyncPull, "cloud"))
        .unwrap();

    assert_eq!(journal.read_day(Utc::now().date_naive()).unwrap().len(), 1);
    let quarantined = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .any(|e| e.file_name().to_string_lossy().contains(".corrupt-"));
    assert!(quarantined);
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = dir.path().join("Logs");
    let journal = DailyJsonJournal::new(logs.clone(), true).unwrap();
    journal
        .record(JournalEntry::new(EventType::TaskCreated, "gmail"))
        .unwrap();
    assert!(!logs.exists());
}

#[test]
fn unknown_event_types_from_other_tools_stay_readable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = DailyJsonJournal::new(dir.path().to_path_buf(), false).unwrap();
    let path = journal.path_for(Utc::now().date_naive());
    let text = r#"[{"timestamp":"x","event_type":"custom_event","actor":"script"}]"#;
    fs::write(&path, text).unwrap();

    journal.record_or_warn(JournalEntry::new(EventType::SignalsMerged, "local"));
    let entries = journal.read_day(Utc::now().date_naive()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["event_type"], "custom_event");
    assert_eq!(entries[1]["event_type"], "signals_merged");
}

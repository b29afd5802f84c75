use agent_vault::store::naming::{
    collision_name, invalid_name, short_hash, stem, task_name, timestamp, unique_task_name,
};
use chrono::{TimeZone, Utc};
use regex::Regex;

#[test]
fn timestamp_is_compact_utc() {
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 5).unwrap();
    assert_eq!(timestamp(at), "20260102_093005");
}

#[test]
fn short_hash_is_stable_hex() {
    let hash = short_hash("message-42");
    assert_eq!(hash.len(), 8);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(hash, short_hash("message-42"));
    assert_ne!(hash, short_hash("message-43"));
}

#[test]
fn task_names_follow_the_convention() {
    let pattern = Regex::new(r"^EMAIL_\d{8}_\d{6}_[0-9a-f]{8}\.md$").unwrap();
    assert!(pattern.is_match(&task_name("EMAIL", "seed")));
    assert!(pattern.is_match(&unique_task_name("EMAIL")));
    assert_ne!(unique_task_name("EMAIL"), unique_task_name("EMAIL"));
}

#[test]
fn collision_names_add_time_and_counter() {
    let at = Utc.with_ymd_and_hms(2026, 1, 2, 9, 30, 0).unwrap();
    assert_eq!(collision_name("report.md", at, 1), "report_093000.md");
    assert_eq!(collision_name("report.md", at, 3), "report_093000_3.md");
    assert_eq!(collision_name("README", at, 1), "README_093000");
}

#[test]
fn stem_drops_markdown_extension() {
    assert_eq!(stem("SYNC_STATUS.md"), "SYNC_STATUS");
    assert_eq!(stem("notes.txt"), "notes.txt");
}

#[test]
fn invalid_names_keep_the_extension() {
    assert_eq!(invalid_name("EMAIL_bad.md"), "EMAIL_bad_INVALID.md");
    assert_eq!(invalid_name("NOTES"), "NOTES_INVALID");
}

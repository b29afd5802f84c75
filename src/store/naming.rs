//! Task filename conventions.
//!
//! Names carry a type prefix, a UTC timestamp and a short content hash:
//! `EMAIL_20260101_093000_ab12cd34.md`. The name is the task's identity.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Timestamp component used in task names.
#[must_use]
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// First eight hex characters of the SHA-256 of `seed`.
#[must_use]
pub fn short_hash(seed: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(seed.as_bytes()));
    digest[..8].to_owned()
}

/// `{prefix}_{timestamp}_{hash}.md` for a deterministic seed.
#[must_use]
pub fn task_name(prefix: &str, seed: &str) -> String {
    format!("{prefix}_{}_{}.md", timestamp(Utc::now()), short_hash(seed))
}

/// `{prefix}_{timestamp}_{hash}.md` seeded with a random UUID.
#[must_use]
pub fn unique_task_name(prefix: &str) -> String {
    task_name(prefix, &uuid::Uuid::new_v4().to_string())
}

/// Name used when `name` is already taken at an archival destination.
///
/// `report.md` becomes `report_093000.md`; later attempts append a counter,
/// `report_093000_2.md`.
#[must_use]
pub fn collision_name(name: &str, now: DateTime<Utc>, attempt: u32) -> String {
    let (stem, ext) = split_ext(name);
    let suffix = now.format("%H%M%S");
    if attempt <= 1 {
        format!("{stem}_{suffix}{ext}")
    } else {
        format!("{stem}_{suffix}_{attempt}{ext}")
    }
}

/// Archive name for a task file that could not be parsed:
/// `EMAIL_x.md` becomes `EMAIL_x_INVALID.md`.
#[must_use]
pub fn invalid_name(name: &str) -> String {
    let (stem, ext) = split_ext(name);
    format!("{stem}_INVALID{ext}")
}

fn split_ext(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Filename stem without the `.md` extension.
#[must_use]
pub fn stem(name: &str) -> &str {
    name.strip_suffix(".md").unwrap_or(name)
}

//! Event sources that turn outside events into `Needs_Action` tasks.
//!
//! A source only knows how to poll and how to render one event as a task
//! file. [`drive`] owns the rest: dedup through [`SeenIds`], creating the
//! file, journaling, and sleeping between polls.

pub mod inbox;

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::journal::{EventType, Journal, JournalEntry};
use crate::store::{SeenIds, Stage, TaskFile, TaskStore};
use crate::{AppError, Result};

pub use inbox::{InboxFile, InboxWatcher};

/// Boxed future returned by [`EventSource::poll`].
pub type PollFuture<'a, E> = Pin<Box<dyn Future<Output = Result<Vec<E>>> + Send + 'a>>;

/// A pollable source of external events.
pub trait EventSource: Send {
    /// One external event.
    type Event: Send;

    /// Source name, used for logs and the seen-ID file.
    fn name(&self) -> &str;

    /// Events currently available. May return already-seen events.
    fn poll(&mut self) -> PollFuture<'_, Self::Event>;

    /// Stable identity of `event` for dedup.
    fn event_id(&self, event: &Self::Event) -> String;

    /// Whether each poll returns every pending event, so an id missing
    /// from a poll belongs to an event that is gone.
    fn lists_all_pending(&self) -> bool {
        false
    }

    /// Task filename and contents for `event`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Data` if the event cannot be represented.
    fn materialize(&self, event: &Self::Event) -> Result<(String, TaskFile)>;
}

/// Poll `source` once and create a task for every unseen event.
///
/// Returns the number of tasks created.
///
/// # Errors
///
/// Returns the error of [`EventSource::poll`]. Per-event failures are
/// logged; an event that failed with a data error is marked seen.
pub async fn poll_once<S: EventSource>(
    source: &mut S,
    store: &TaskStore,
    seen: &mut SeenIds,
    journal: &dyn Journal,
) -> Result<usize> {
    let events = source.poll().await?;
    let mut created = 0;
    let mut dirty = false;
    if source.lists_all_pending() {
        let live: HashSet<String> = events.iter().map(|e| source.event_id(e)).collect();
        dirty |= seen.retain_live(&live);
    }
    for event in &events {
        let id = source.event_id(event);
        if seen.contains(&id) {
            continue;
        }
        let (name, task) = match source.materialize(event) {
            Ok(rendered) => rendered,
            Err(err @ AppError::Data(_)) => {
                warn!(source = source.name(), id, %err, "event cannot be turned into a task");
                dirty |= seen.insert(id);
                continue;
            }
            Err(err) => {
                warn!(source = source.name(), id, %err, "failed to render event");
                continue;
            }
        };
        match store.create(&Stage::NeedsAction, &name, &task) {
            Ok(_) => {
                info!(source = source.name(), file = name, "task created");
                journal.record_or_warn(
                    JournalEntry::new(EventType::TaskCreated, source.name())
                        .with_file(name.as_str())
                        .with_detail("event_id", id.as_str()),
                );
                dirty |= seen.insert(id);
                created += 1;
            }
            Err(err) => {
                warn!(source = source.name(), file = name, %err, "failed to create task");
            }
        }
    }
    if dirty {
        seen.save()?;
    }
    Ok(created)
}

/// Poll `source` every `interval` until `cancel` fires.
pub async fn drive<S: EventSource>(
    mut source: S,
    store: TaskStore,
    mut seen: SeenIds,
    journal: &dyn Journal,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!(
        source = source.name(),
        interval_secs = interval.as_secs(),
        seen = seen.len(),
        "watcher started"
    );
    loop {
        match poll_once(&mut source, &store, &mut seen, journal).await {
            Ok(0) => debug!(source = source.name(), "nothing new"),
            Ok(created) => debug!(source = source.name(), created, "poll finished"),
            Err(err) => warn!(source = source.name(), %err, "poll failed"),
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
        }
    }
    info!(source = source.name(), "watcher stopped");
}

/// Seen-ID file for `source` under `Logs`.
#[must_use]
pub fn seen_path(store: &TaskStore, source: &str) -> std::path::PathBuf {
    store.logs_dir().join(format!(".seen_{source}.json"))
}

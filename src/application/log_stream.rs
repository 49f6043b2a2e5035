use crate::domain::log::{AgentLog, LogEntry, LogId};
use std::time::Duration;

/// Accumulates agent messages and reveals them one at a time.
///
/// `submit` stamps a batch and hands back the reveal delay of every entry; the owner
/// schedules those and calls `reveal` when each one elapses. Entries dropped by `clear`
/// are forgotten, so a reveal that fires afterwards is a no-op.
#[derive(Debug, Default)]
pub struct LogStream {
    visible: Vec<LogEntry>,
    pending: Vec<LogEntry>,
    stagger: Duration,
}

impl LogStream {
    /// Creates an empty stream whose batches reveal one entry per `stagger`.
    pub fn new(stagger: Duration) -> Self {
        Self {
            visible: Vec::new(),
            pending: Vec::new(),
            stagger,
        }
    }

    /// Admits `batch` and returns `(delay, id)` per entry, in batch order.
    pub fn submit(&mut self, batch: Vec<AgentLog>) -> Vec<(Duration, LogId)> {
        batch
            .into_iter()
            .enumerate()
            .map(|(index, log)| {
                let entry = LogEntry::new(log);
                let id = entry.id();
                self.pending.push(entry);
                (self.stagger * index as u32, id)
            })
            .collect()
    }

    /// Moves a pending entry to the end of the visible list.
    pub fn reveal(&mut self, id: LogId) -> Option<&LogEntry> {
        let position = self.pending.iter().position(|entry| entry.id() == id)?;
        let entry = self.pending.remove(position);
        self.visible.push(entry);
        self.visible.last()
    }

    /// Empties the visible list and forgets everything not yet revealed.
    pub fn clear(&mut self) {
        self.visible.clear();
        self.pending.clear();
    }

    pub fn visible(&self) -> &[LogEntry] {
        &self.visible
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

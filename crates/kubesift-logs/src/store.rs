use std::sync::Arc;

use parking_lot::RwLock;

use kubesift_types::LogEntry;

/// Thread-safe append-only store for log entries
///
/// Clones share the same storage. Entries are only ever appended or cleared
/// all at once; an entry is never changed after it has been stored.
#[derive(Clone, Default)]
pub struct LogStore {
    entries: Arc<RwLock<Vec<LogEntry>>>,
}

impl LogStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry at the end
    pub fn append(&self, entry: LogEntry) {
        self.entries.write().push(entry);
    }

    /// Append a batch under a single write lock, keeping batch order
    pub fn extend(&self, batch: impl IntoIterator<Item = LogEntry>) {
        self.entries.write().extend(batch);
    }

    /// Copy of all entries in insertion order
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.read().clone()
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl std::fmt::Debug for LogStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStore")
            .field("len", &self.len())
            .finish()
    }
}

//! Session registry.
//!
//! The single source of truth for live sessions. Every public operation is
//! one acquisition of the inner lock, so lookups, inserts, and removals are
//! linearizable; the map itself never escapes this module. Callers that need
//! to do I/O against a session clone cheap handles out via [`with_record`]
//! and work after the lock is released.
//!
//! [`with_record`]: SessionRegistry::with_record

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tokio::sync::Mutex;

use crate::session::models::SessionRecord;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionRecord>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record under its id. When the id is already taken the
    /// record is handed back so the caller can dispose of it.
    pub async fn insert(&self, record: SessionRecord) -> Result<(), SessionRecord> {
        let mut sessions = self.sessions.lock().await;
        match sessions.entry(record.id().to_string()) {
            Entry::Occupied(_) => Err(record),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    /// Take a record out, ending its registration. Concurrent operations on
    /// the same id observe either the record or its absence, never both.
    pub async fn remove(&self, id: &str) -> Option<SessionRecord> {
        self.sessions.lock().await.remove(id)
    }

    /// Run a closure against a record while the registry lock is held.
    ///
    /// The closure must stay short and non-blocking: clone out whatever
    /// handles the caller needs and do the actual work after this returns.
    /// Returns `None` when the id is unknown.
    pub async fn with_record<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(id).map(f)
    }

    /// Drain every record, leaving the registry empty. Used at shutdown.
    pub async fn take_all(&self) -> Vec<SessionRecord> {
        let mut sessions = self.sessions.lock().await;
        sessions.drain().map(|(_, record)| record).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

//! Process-wide table of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::manager::SessionHandle;

/// Live sessions keyed by id.
///
/// A session is inserted when it starts connecting and removed when it
/// reaches `closed` or `failed`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: Arc<SessionHandle>) {
        self.sessions
            .write()
            .insert(handle.id().to_string(), handle);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.write().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshot of all live sessions.
    pub fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions.read().values().cloned().collect()
    }
}

//! Session-local key-value slot.
//!
//! The only client-persisted datum the core owns is the login timestamp used
//! for the hard session ceiling. It lives in a scoped slot the embedder
//! provides (browser local storage, a file, ...); [`MemorySlot`] is the
//! default for tests and headless embedders.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Scoped, session-local key-value storage. Synchronous by design: logout
/// must clear it before any async cleanup runs.
pub trait SessionSlot: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-memory slot implementation.
#[derive(Debug, Default)]
pub struct MemorySlot {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionSlot for MemorySlot {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: &str, value: String) {
        self.entries.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

//! Registry of claimed issue identifiers
//!
//! An identifier is present while some worker holds a claim on it, and stays
//! present once that worker has persisted the issue. A failed fetch releases
//! the claim so another discovery branch may try again.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Thread-safe set of claimed issue identifiers
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: Mutex<HashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims `issue_id`
    ///
    /// Returns false if it was already claimed; the caller drops its task.
    pub fn claim(&self, issue_id: &str) -> bool {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        if claimed.contains(issue_id) {
            return false;
        }
        claimed.insert(issue_id.to_string())
    }

    /// Re-opens `issue_id` after a failed fetch
    pub fn release(&self, issue_id: &str) {
        let mut claimed = self.claimed.lock().unwrap_or_else(PoisonError::into_inner);
        claimed.remove(issue_id);
    }

    pub fn contains(&self, issue_id: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(issue_id)
    }

    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

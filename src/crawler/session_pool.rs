//! Per-worker authenticated session lifecycle
//!
//! Each worker acquires exactly one `SessionLease` when it starts and holds
//! it until it returns. The lease is released in `Drop`, so release happens
//! on every exit path, unwinding included.

use crate::tracker::{build_http_client, AuthSession, ClientSettings};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Hands out independent sessions, one per worker
#[derive(Debug)]
pub struct SessionPool {
    settings: ClientSettings,
    next_id: AtomicUsize,
    active: Arc<AtomicUsize>,
}

impl SessionPool {
    /// Creates a pool; session ids start at 1 (0 is the orchestrator's own session)
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            next_id: AtomicUsize::new(1),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Opens the orchestrator's primary session (id 0), outside the lease count
    pub fn primary(&self) -> Result<AuthSession, reqwest::Error> {
        let client = build_http_client(&self.settings)?;
        Ok(AuthSession::new(0, client, self.settings.session_ttl))
    }

    /// Opens a fresh, unauthenticated session with its own cookie store
    ///
    /// Login is deferred to the worker's first validity check.
    pub fn acquire(&self) -> Result<SessionLease, reqwest::Error> {
        let client = build_http_client(&self.settings)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        self.active.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session = id, "Session acquired");

        Ok(SessionLease {
            session: AuthSession::new(id, client, self.settings.session_ttl),
            active: Arc::clone(&self.active),
        })
    }

    /// Leases currently held
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Total leases handed out so far
    pub fn opened(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

/// Exclusive ownership of one session
#[derive(Debug)]
pub struct SessionLease {
    session: AuthSession,
    active: Arc<AtomicUsize>,
}

impl Deref for SessionLease {
    type Target = AuthSession;

    fn deref(&self) -> &AuthSession {
        &self.session
    }
}

impl DerefMut for SessionLease {
    fn deref_mut(&mut self) -> &mut AuthSession {
        &mut self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.session.invalidate();
        self.active.fetch_sub(1, Ordering::SeqCst);
        tracing::debug!(session = self.session.id(), "Session released");
    }
}

//! Authenticated tracker sessions
//!
//! An `AuthSession` is one logical actor's connection state: its own HTTP
//! client (and therefore its own cookie jar) plus the time it last logged in.
//! Sessions are never shared between workers.

use reqwest::Client;
use std::time::{Duration, Instant};

/// HTTP client settings used to open new sessions
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// How long a login stays valid
    pub session_ttl: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("issue-crawler/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            session_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Builds an HTTP client with a private cookie store
pub fn build_http_client(settings: &ClientSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// One authenticated (or not yet authenticated) connection to the tracker
#[derive(Debug)]
pub struct AuthSession {
    id: usize,
    client: Client,
    authenticated_at: Option<Instant>,
    ttl: Duration,
}

impl AuthSession {
    /// Opens a fresh, unauthenticated session
    pub fn new(id: usize, client: Client, ttl: Duration) -> Self {
        Self {
            id,
            client,
            authenticated_at: None,
            ttl,
        }
    }

    /// Session number (0 is the orchestrator's primary session)
    pub fn id(&self) -> usize {
        self.id
    }

    /// The HTTP client owned by this session
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Records a successful login
    pub fn mark_authenticated(&mut self) {
        self.authenticated_at = Some(Instant::now());
    }

    /// Forgets the login, forcing the next validity check to fail
    pub fn invalidate(&mut self) {
        self.authenticated_at = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated_at.is_some()
    }

    /// True when logged in and the login is younger than the session TTL
    pub fn is_fresh(&self) -> bool {
        self.authenticated_at
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }
}

//! reqwest-backed tracker client
//!
//! `HttpTracker` implements the authentication, search and issue fetch
//! traits against a tracker web UI:
//! - Login is a form POST to `<base>/login.do` with `id` / `password` fields
//! - Search is `GET <base>/search?query=..&max=..`
//! - Issue pages are fetched from the URL found in search results or links
//!
//! Landing on the login page (by URL or by page title) after any request
//! means the session is not, or no longer, authenticated.

use crate::tracker::parser::{is_login_page, page_title, parse_issue_page, parse_search_results};
use crate::tracker::session::AuthSession;
use crate::tracker::traits::{AuthError, Authenticator, FetchError, IssueFetcher, SearchError, SearchExecutor};
use crate::tracker::types::{IssueRecord, IssueRef};
use async_trait::async_trait;
use url::Url;

/// Tracker client holding the base URL and account credentials
///
/// The tracker itself is stateless; all connection state lives in the
/// `AuthSession` passed to each call.
#[derive(Debug, Clone)]
pub struct HttpTracker {
    base_url: Url,
    username: String,
    password: String,
}

impl HttpTracker {
    /// Creates a tracker client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Root URL of the tracker, e.g. `https://ims.example.com/tody/ims`
    /// * `username` - Login id
    /// * `password` - Login password
    pub fn new(base_url: Url, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url,
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds `<base>/<path>` without dropping the last base path segment
    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{}/{}", base, path))
    }
}

#[async_trait]
impl Authenticator for HttpTracker {
    async fn login(&self, session: &mut AuthSession) -> Result<(), AuthError> {
        let url = self
            .endpoint("login.do")
            .map_err(|e| AuthError::Rejected(format!("Invalid login URL: {}", e)))?;

        tracing::debug!(session = session.id(), "Logging in as {}", self.username);

        let response = session
            .client()
            .post(url.clone())
            .form(&[("id", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(|source| AuthError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(AuthError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| AuthError::Http {
            url: final_url.clone(),
            source,
        })?;

        let title = page_title(&body);
        if is_login_page(&final_url, title.as_deref()) {
            session.invalidate();
            return Err(AuthError::Rejected(format!(
                "still on the login page after submitting credentials ({})",
                final_url
            )));
        }

        session.mark_authenticated();
        tracing::info!(session = session.id(), "Authenticated against {}", self.base_url);
        Ok(())
    }
}

#[async_trait]
impl SearchExecutor for HttpTracker {
    async fn search(
        &self,
        session: &AuthSession,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<IssueRef>, SearchError> {
        let mut url = self
            .endpoint("search")
            .map_err(|e| SearchError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("max", &max_results.to_string());

        tracing::debug!("Searching: {}", url);

        let response = session
            .client()
            .get(url.clone())
            .send()
            .await
            .map_err(|source| SearchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(SearchError::Status {
                url: final_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| SearchError::Http {
            url: final_url.to_string(),
            source,
        })?;

        if is_login_page(final_url.as_str(), page_title(&body).as_deref()) {
            return Err(SearchError::SessionExpired);
        }

        Ok(parse_search_results(&body, &final_url, max_results))
    }
}

#[async_trait]
impl IssueFetcher for HttpTracker {
    async fn fetch_issue(
        &self,
        session: &mut AuthSession,
        issue: &IssueRef,
    ) -> Result<IssueRecord, FetchError> {
        let response = session
            .client()
            .get(&issue.url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: issue.url.clone(),
                source,
            })?;

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: issue.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|source| FetchError::Http {
            url: issue.url.clone(),
            source,
        })?;

        if is_login_page(&final_url, page_title(&body).as_deref()) {
            session.invalidate();
            return Err(FetchError::SessionExpired {
                url: issue.url.clone(),
            });
        }

        let crawled_at = chrono::Utc::now().to_rfc3339();
        parse_issue_page(&body, issue, &crawled_at).map_err(|message| FetchError::Parse {
            url: issue.url.clone(),
            message,
        })
    }
}

//! Authenticated Reddit API client.
//!
//! Handles the OAuth2 token dance and the two read calls the monitor needs:
//! the newest posts of a subreddit and the identity of the logged-in account.
//!
//! ## Grants
//!
//! | Grant                 | Configured by                     | User context |
//! |-----------------------|-----------------------------------|--------------|
//! | `refresh_token`       | a refresh token                   | yes          |
//! | `password`            | username + password (script apps) | yes          |
//! | `client_credentials`  | client id + secret only           | no           |
//!
//! Reddit answers a bad grant with `200 OK` and an `error` field, so the token
//! body is always inspected, not just the status.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::post::{parse_listing, Post};

/// Host that issues OAuth tokens.
pub const DEFAULT_AUTH_URL: &str = "https://www.reddit.com";

/// Host that serves authenticated API calls.
pub const DEFAULT_API_URL: &str = "https://oauth.reddit.com";

/// Refresh a cached token this long before Reddit would reject it.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Lifetime assumed when the token response omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Upper bound on a token's cached lifetime, whatever `expires_in` claims.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reddit client errors.
#[derive(Debug, Error)]
pub enum RedditError {
    /// The token endpoint refused the credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// An API call returned a non-success status.
    #[error("Reddit API returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON deserialization failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Not a syntactically valid subreddit name.
    #[error("invalid subreddit name: {0:?}")]
    InvalidSubreddit(String),
    /// The call needs a user account but the client authenticated as an app.
    #[error("application-only credentials have no user context")]
    NoUserContext,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How the client obtains its access token.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    RefreshToken(String),
    Password { username: String, password: String },
    ClientCredentials,
}

impl Grant {
    /// Whether tokens from this grant act on behalf of a user account.
    pub fn has_user_context(&self) -> bool {
        !matches!(self, Grant::ClientCredentials)
    }

    fn form(&self) -> Vec<(&'static str, &str)> {
        match self {
            Grant::RefreshToken(token) => {
                vec![("grant_type", "refresh_token"), ("refresh_token", token.as_str())]
            }
            Grant::Password { username, password } => vec![
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ],
            Grant::ClientCredentials => vec![("grant_type", "client_credentials")],
        }
    }
}

impl fmt::Debug for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grant::RefreshToken(_) => f.write_str("RefreshToken([REDACTED])"),
            Grant::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Grant::ClientCredentials => f.write_str("ClientCredentials"),
        }
    }
}

/// OAuth application credentials plus the grant to use.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub grant: Grant,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("grant", &self.grant)
            .finish()
    }
}

/// Everything [`RedditClient::connect`] needs.
#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub credentials: Credentials,
    /// Reddit rejects requests with generic user agents.
    pub user_agent: String,
    /// Base URL of the token endpoint host.
    pub auth_url: String,
    /// Base URL of the OAuth API host.
    pub api_url: String,
}

impl RedditConfig {
    /// Config against the production Reddit hosts.
    pub fn new(credentials: Credentials, user_agent: impl Into<String>) -> Self {
        Self {
            credentials,
            user_agent: user_agent.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    /// A string like `"invalid_grant"`, or occasionally a numeric status.
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Account {
    name: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Cheaply cloneable handle to an authenticated Reddit session.
#[derive(Clone)]
pub struct RedditClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    config: RedditConfig,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// Build a client and fetch its first access token.
    ///
    /// Authenticating up front means bad credentials fail here, at startup,
    /// rather than as silence once streaming begins.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::Auth`] if Reddit rejects the credentials, or a
    /// transport error if the token endpoint cannot be reached.
    pub async fn connect(config: RedditConfig) -> Result<Self, RedditError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let client = Self {
            inner: Arc::new(Inner {
                http,
                config,
                token: Mutex::new(None),
            }),
        };
        client.access_token().await?;
        info!(grant = ?client.inner.config.credentials.grant, "authenticated with Reddit");
        Ok(client)
    }

    pub fn has_user_context(&self) -> bool {
        self.inner.config.credentials.grant.has_user_context()
    }

    /// Fetch up to `limit` of the newest posts in `subreddit`, newest first.
    pub async fn new_posts(&self, subreddit: &str, limit: u32) -> Result<Vec<Post>, RedditError> {
        let subreddit = normalize_subreddit(subreddit)?;
        let limit = limit.to_string();
        let response = self
            .get(
                &format!("/r/{subreddit}/new"),
                &[("limit", limit.as_str()), ("raw_json", "1")],
            )
            .await?;
        let body = response.bytes().await?;
        let posts = parse_listing(&body)?;
        debug!(subreddit = %subreddit, count = posts.len(), "fetched listing");
        Ok(posts)
    }

    /// Name of the account the client is acting as.
    ///
    /// # Errors
    ///
    /// Returns [`RedditError::NoUserContext`] for application-only grants.
    pub async fn me(&self) -> Result<String, RedditError> {
        if !self.has_user_context() {
            return Err(RedditError::NoUserContext);
        }
        let response = self.get("/api/v1/me", &[]).await?;
        let body = response.bytes().await?;
        let account: Account = serde_json::from_slice(&body)?;
        Ok(account.name)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, RedditError> {
        let token = self.access_token().await?;
        let url = format!("{}{path}", self.inner.config.api_url.trim_end_matches('/'));
        let response = self
            .inner
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            // Revoked early; make the next call fetch a new one.
            *self.inner.token.lock().await = None;
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedditError::Api { status, body });
        }
        Ok(response)
    }

    /// Return the cached token, fetching a new one if it is about to expire.
    async fn access_token(&self) -> Result<String, RedditError> {
        let mut cached = self.inner.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken, RedditError> {
        let config = &self.inner.config;
        let credentials = &config.credentials;
        let url = format!(
            "{}/api/v1/access_token",
            config.auth_url.trim_end_matches('/')
        );

        let response = self
            .inner
            .http
            .post(url)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&credentials.grant.form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RedditError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let body = response.bytes().await?;
        match serde_json::from_slice::<TokenResponse>(&body)? {
            TokenResponse {
                error: Some(error), ..
            } => Err(RedditError::Auth(match error {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })),
            TokenResponse {
                access_token: Some(value),
                expires_in,
                ..
            } => {
                let lifetime = expires_in
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_TOKEN_LIFETIME)
                    .min(MAX_TOKEN_LIFETIME);
                debug!(expires_in = lifetime.as_secs(), "access token issued");
                Ok(AccessToken {
                    value,
                    expires_at: Instant::now() + lifetime,
                })
            }
            TokenResponse { .. } => Err(RedditError::Auth(
                "token response has no access_token".to_string(),
            )),
        }
    }
}

impl fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// Validate a subreddit name, accepting an optional `r/` or `/r/` prefix.
///
/// Reddit names are 2–21 characters of ASCII letters, digits and `_`.
pub fn normalize_subreddit(name: &str) -> Result<String, RedditError> {
    let trimmed = name.trim();
    let bare = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed);

    let valid_len = (2..=21).contains(&bare.len());
    let valid_chars = bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_len && valid_chars {
        Ok(bare.to_string())
    } else {
        Err(RedditError::InvalidSubreddit(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Configuration loaded from environment variables.
//!
//! There is no configuration file.  Only the OAuth client id and secret are
//! required; everything else has a default.
//!
//! | Variable                    | Default                          |
//! |-----------------------------|----------------------------------|
//! | `REDDIT_CLIENT_ID`          | required                         |
//! | `REDDIT_CLIENT_SECRET`      | required                         |
//! | `REDDIT_REFRESH_TOKEN`      | unset                            |
//! | `REDDIT_USERNAME`           | unset (needs `REDDIT_PASSWORD`)  |
//! | `REDDIT_PASSWORD`           | unset (needs `REDDIT_USERNAME`)  |
//! | `REDDIT_USER_AGENT`         | `rust:reddit-monitor:v<version>` |
//! | `REDDIT_SUBREDDITS`         | `testingground4bots`             |
//! | `REDDIT_POLL_INTERVAL_SECS` | `5`                              |
//! | `REDDIT_DISCARD_INITIAL`    | `false`                          |
//!
//! A refresh token takes priority over username/password.  With neither, the
//! client authenticates as the application only.

use std::time::Duration;

use thiserror::Error;

use crate::reddit::{
    normalize_subreddit, Credentials, Grant, RedditConfig, StreamOptions, DEFAULT_POLL_INTERVAL,
};

/// Subreddits monitored when `REDDIT_SUBREDDITS` is not set.
pub const DEFAULT_SUBREDDITS: &[&str] = &["testingground4bots"];

const CLIENT_ID: &str = "REDDIT_CLIENT_ID";
const CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
const REFRESH_TOKEN: &str = "REDDIT_REFRESH_TOKEN";
const USERNAME: &str = "REDDIT_USERNAME";
const PASSWORD: &str = "REDDIT_PASSWORD";
const USER_AGENT: &str = "REDDIT_USER_AGENT";
const SUBREDDITS: &str = "REDDIT_SUBREDDITS";
const POLL_INTERVAL: &str = "REDDIT_POLL_INTERVAL_SECS";
const DISCARD_INITIAL: &str = "REDDIT_DISCARD_INITIAL";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub reddit: RedditConfig,
    pub stream: StreamOptions,
    pub subreddits: Vec<String>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.  Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let grant = match (get(REFRESH_TOKEN), get(USERNAME), get(PASSWORD)) {
            (Some(token), _, _) => Grant::RefreshToken(token),
            (None, Some(username), Some(password)) => Grant::Password { username, password },
            (None, Some(_), None) => return Err(ConfigError::Missing(PASSWORD)),
            (None, None, Some(_)) => return Err(ConfigError::Missing(USERNAME)),
            (None, None, None) => Grant::ClientCredentials,
        };

        let credentials = Credentials {
            client_id: require(CLIENT_ID)?,
            client_secret: require(CLIENT_SECRET)?,
            grant,
        };
        let user_agent = get(USER_AGENT).unwrap_or_else(default_user_agent);

        let subreddits = match get(SUBREDDITS) {
            Some(list) => parse_subreddits(&list)?,
            None => DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
        };

        let interval = match get(POLL_INTERVAL) {
            Some(raw) => parse_interval(&raw)?,
            None => DEFAULT_POLL_INTERVAL,
        };
        let discard_initial = match get(DISCARD_INITIAL) {
            Some(raw) => parse_bool(DISCARD_INITIAL, &raw)?,
            None => false,
        };

        Ok(Self {
            reddit: RedditConfig::new(credentials, user_agent),
            stream: StreamOptions {
                interval,
                discard_initial,
                ..StreamOptions::default()
            },
            subreddits,
        })
    }
}

fn default_user_agent() -> String {
    format!(
        "rust:{}:v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

fn parse_subreddits(list: &str) -> Result<Vec<String>, ConfigError> {
    let subreddits = list
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            normalize_subreddit(name).map_err(|e| ConfigError::Invalid {
                key: SUBREDDITS,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if subreddits.is_empty() {
        return Err(ConfigError::Invalid {
            key: SUBREDDITS,
            reason: "no subreddit names given".to_string(),
        });
    }
    Ok(subreddits)
}

fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key: POLL_INTERVAL,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::Invalid {
            key: POLL_INTERVAL,
            reason: e.to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected true or false, got {raw:?}"),
        }),
    }
}

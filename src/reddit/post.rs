//! The post record delivered by the Reddit stream.
//!
//! Reddit wraps everything in "things" (`{kind, data}`) and lists them in a
//! `Listing` envelope.  [`parse_listing`] peels both layers off so the rest of
//! the crate only ever sees [`Post`] values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Base URL used to turn a relative permalink into a clickable link.
const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// A single submission in a subreddit.
///
/// Only the fields the monitor's callers are likely to need are kept; the
/// rest of Reddit's (very large) payload is ignored during deserialisation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Post {
    /// Short base-36 id, e.g. `"iw1c4b"`.
    pub id: String,

    /// Fullname (`t3_` + id).  Unique across Reddit; used for de-duplication.
    #[serde(rename = "name")]
    pub full_id: String,

    pub title: String,

    /// Author's username, or `"[deleted]"`.
    pub author: String,

    /// Subreddit name without the `r/` prefix.
    pub subreddit: String,

    /// Creation time.  Reddit sends this as fractional Unix seconds.
    #[serde(rename = "created_utc", deserialize_with = "de_unix_seconds")]
    pub created: DateTime<Utc>,

    /// Link target.  For self posts this points back at the post itself.
    #[serde(default)]
    pub url: Option<String>,

    /// Path relative to reddit.com, e.g. `/r/rust/comments/iw1c4b/...`.
    pub permalink: String,

    #[serde(default)]
    pub is_self: bool,

    /// Markdown body of a self post; empty for link posts.
    #[serde(default, rename = "selftext")]
    pub body: String,

    #[serde(default)]
    pub score: i64,

    #[serde(default)]
    pub num_comments: u64,
}

impl Post {
    /// Absolute URL of the post's comment page.
    pub fn permalink_url(&self) -> String {
        format!("{REDDIT_WEB_BASE}{}", self.permalink)
    }
}

fn de_unix_seconds<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1_000_000_000.0).round() as u32;
    DateTime::from_timestamp(whole, nanos.min(999_999_999))
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {secs}")))
}

// ---------------------------------------------------------------------------
// Listing envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Listing<T> {
    children: Vec<Thing<T>>,
}

/// Parse a `/r/{subreddit}/new` response body into posts.
///
/// Posts come back in listing order, which for `/new` is newest first.
/// This is a pure function (no I/O) so tests can feed it canned JSON.
pub fn parse_listing(body: &[u8]) -> Result<Vec<Post>, serde_json::Error> {
    let listing: Thing<Listing<Post>> = serde_json::from_slice(body)?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|thing| thing.data)
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const LISTING: &str = r#"{
      "kind": "Listing",
      "data": {
        "after": "t3_b",
        "dist": 2,
        "children": [
          {
            "kind": "t3",
            "data": {
              "id": "b",
              "name": "t3_b",
              "title": "Second",
              "author": "bob",
              "subreddit": "testingground4bots",
              "created_utc": 1600000100.0,
              "url": "https://example.com/article",
              "permalink": "/r/testingground4bots/comments/b/second/",
              "is_self": false,
              "selftext": "",
              "score": 3,
              "num_comments": 1,
              "over_18": false
            }
          },
          {
            "kind": "t3",
            "data": {
              "id": "a",
              "name": "t3_a",
              "title": "First",
              "author": "alice",
              "subreddit": "testingground4bots",
              "created_utc": 1600000000.5,
              "permalink": "/r/testingground4bots/comments/a/first/",
              "is_self": true,
              "selftext": "hello there"
            }
          }
        ]
      }
    }"#;

    #[test]
    fn parse_listing_extracts_posts_in_listing_order() {
        let posts = parse_listing(LISTING.as_bytes()).unwrap();

        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].full_id, "t3_b");
        assert_eq!(posts[0].title, "Second");
        assert_eq!(posts[0].author, "bob");
        assert_eq!(posts[0].url.as_deref(), Some("https://example.com/article"));
        assert_eq!(posts[0].score, 3);
        assert_eq!(posts[0].num_comments, 1);
        assert!(!posts[0].is_self);
        assert_eq!(
            posts[0].created,
            Utc.with_ymd_and_hms(2020, 9, 13, 12, 28, 20).unwrap()
        );

        assert_eq!(posts[1].id, "a");
        assert!(posts[1].is_self);
        assert_eq!(posts[1].body, "hello there");
        assert!(posts[1].url.is_none(), "missing url defaults to None");
        assert_eq!(posts[1].score, 0, "missing score defaults to zero");
    }

    #[test]
    fn fractional_timestamps_keep_subsecond_precision() {
        let posts = parse_listing(LISTING.as_bytes()).unwrap();
        assert_eq!(posts[1].created.timestamp(), 1_600_000_000);
        assert_eq!(posts[1].created.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn empty_listing_yields_no_posts() {
        let body = r#"{"kind": "Listing", "data": {"after": null, "children": []}}"#;
        assert!(parse_listing(body.as_bytes()).unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_listing(b"<html>rate limited</html>").is_err());
    }

    #[test]
    fn permalink_url_is_absolute() {
        let posts = parse_listing(LISTING.as_bytes()).unwrap();
        assert_eq!(
            posts[1].permalink_url(),
            "https://www.reddit.com/r/testingground4bots/comments/a/first/"
        );
    }
}

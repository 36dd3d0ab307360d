//! Reddit-backed post streaming.
//!
//! * [`RedditClient`] — OAuth session and the raw API calls.
//! * [`RedditStream`] — a [`StreamProvider`](crate::stream::StreamProvider)
//!   that polls each subreddit's `/new` listing on a timer.
//! * [`Post`] — the record handed to the monitor's callback.

mod client;
mod post;
mod stream;

#[cfg(test)]
mod testing;

// Re-export the public API so callers can write
// `use reddit_monitor::reddit::{RedditClient, RedditStream, Post};`
pub use client::{
    normalize_subreddit, Credentials, Grant, RedditClient, RedditConfig, RedditError,
    DEFAULT_API_URL, DEFAULT_AUTH_URL,
};
pub use post::{parse_listing, Post};
pub use stream::{RedditStream, StreamOptions, DEFAULT_POLL_INTERVAL};

//! Polling stream of new posts, one background task per subreddit.
//!
//! Each task ticks on a fixed interval, fetches the newest posts, drops the
//! ones it has already sent, and pushes the rest (oldest first) down the post
//! channel.  Fetch failures go down the error channel and polling carries on;
//! there is no backoff.
//!
//! ## For contributors
//!
//! The seen-set is the only state a task keeps.  It is bounded, so a very old
//! post that somehow reappears in the newest 100 after being evicted would be
//! sent again.  With the default capacity that needs 10 000 newer posts in
//! between, which does not happen on a single subreddit.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::client::{normalize_subreddit, RedditClient, RedditError};
use super::post::Post;
use crate::stream::{PostStream, StopHandle, StreamProvider};

/// How often each subreddit is polled unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Posts requested per poll (Reddit's maximum page size).
const LISTING_LIMIT: u32 = 100;

/// Fullnames remembered per subreddit before the oldest are forgotten.
const SEEN_CAPACITY: usize = 10_000;

/// Polling behaviour shared by every stream a [`RedditStream`] opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub interval: Duration,
    /// Treat the first successful fetch as history: remember it, send nothing.
    pub discard_initial: bool,
    /// Stop after this many requests.  `0` means never.
    pub max_requests: u32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            discard_initial: false,
            max_requests: 0,
        }
    }
}

/// [`StreamProvider`] that polls Reddit's `/new` listing.
pub struct RedditStream {
    client: RedditClient,
    options: StreamOptions,
}

impl RedditStream {
    pub fn new(client: RedditClient, options: StreamOptions) -> Self {
        Self { client, options }
    }
}

impl StreamProvider for RedditStream {
    type Post = Post;
    type Error = RedditError;

    /// Spawn the polling task for `subreddit`.
    ///
    /// The stop handle only acts when invoked; dropping it leaves the task
    /// running until the post receiver is dropped.
    fn stream_posts(&self, subreddit: &str) -> Result<PostStream<Post, RedditError>, RedditError> {
        let subreddit = normalize_subreddit(subreddit)?;
        let (posts_tx, posts) = mpsc::unbounded_channel();
        let (errors_tx, errors) = mpsc::unbounded_channel();
        let stop = Arc::new(Notify::new());

        let poller = Poller {
            client: self.client.clone(),
            subreddit,
            options: self.options.clone(),
            seen: SeenPosts::new(SEEN_CAPACITY),
            posts_tx,
            errors_tx,
        };
        tokio::spawn(poller.run(Arc::clone(&stop)));

        Ok(PostStream {
            posts,
            errors,
            stop: StopHandle::new(move || stop.notify_one()),
        })
    }
}

/// State owned by one polling task.
struct Poller {
    client: RedditClient,
    subreddit: String,
    options: StreamOptions,
    seen: SeenPosts,
    posts_tx: mpsc::UnboundedSender<Post>,
    errors_tx: mpsc::UnboundedSender<RedditError>,
}

impl Poller {
    /// Poll until stopped, out of requests, or nobody is listening.
    ///
    /// Returning drops both senders, which closes the stream.
    async fn run(mut self, stop: Arc<Notify>) {
        debug!(subreddit = %self.subreddit, "polling started");

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut discard_pending = self.options.discard_initial;
        let mut requests: u32 = 0;

        loop {
            tokio::select! {
                _ = stop.notified() => break,
                _ = ticker.tick() => {}
            }
            if self.posts_tx.is_closed() {
                break;
            }

            let result = tokio::select! {
                _ = stop.notified() => break,
                result = self.client.new_posts(&self.subreddit, LISTING_LIMIT) => result,
            };
            requests = requests.saturating_add(1);

            match result {
                Ok(listing) => {
                    let fresh = self.take_unseen(listing);
                    if discard_pending {
                        discard_pending = false;
                        debug!(
                            subreddit = %self.subreddit,
                            count = fresh.len(),
                            "discarded initial posts"
                        );
                    } else if !self.send_all(fresh) {
                        break;
                    }
                }
                Err(e) => {
                    // A closed error channel is not a reason to stop posting.
                    let _ = self.errors_tx.send(e);
                }
            }

            if self.options.max_requests > 0 && requests >= self.options.max_requests {
                break;
            }
        }

        debug!(subreddit = %self.subreddit, requests, "polling stopped");
    }

    /// Remember every post in `listing` and return the new ones, oldest first.
    ///
    /// The listing is newest first, so it is reversed before the stable sort;
    /// posts created in the same second keep their arrival order.
    fn take_unseen(&mut self, listing: Vec<Post>) -> Vec<Post> {
        let mut fresh: Vec<Post> = listing
            .into_iter()
            .rev()
            .filter(|post| self.seen.insert(&post.full_id))
            .collect();
        fresh.sort_by_key(|post| post.created);
        fresh
    }

    /// Returns `false` once the receiver is gone.
    fn send_all(&self, posts: Vec<Post>) -> bool {
        posts.into_iter().all(|post| self.posts_tx.send(post).is_ok())
    }
}

/// Bounded set of post fullnames, evicting the oldest when full.
struct SeenPosts {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl SeenPosts {
    fn new(capacity: usize) -> Self {
        Self {
            ids: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Record `id`.  Returns `true` if it had not been seen before.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        true
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.ids.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

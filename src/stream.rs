//! Stream provider abstraction.
//!
//! A [`StreamProvider`] turns a subreddit name into a [`PostStream`]: two
//! unbounded producers (posts and errors) plus a [`StopHandle`] that tears
//! the stream down.  The [`Monitor`](crate::monitor::Monitor) only ever talks
//! to this trait, so it never needs to know how posts are fetched.
//!
//! ## For contributors — adding a new provider
//!
//! 1. Define a struct holding whatever the provider needs (client, options).
//! 2. Implement [`StreamProvider`] for it.  `stream_posts()` should start the
//!    background work and return immediately.
//! 3. Close both channels once the stream ends, whether it was stopped or ran
//!    out on its own.  The monitor's forwarding tasks exit on close.
//!
//! [`RedditStream`](crate::reddit::RedditStream) is the worked example.

use std::fmt;

use tokio::sync::mpsc;

/// Trait that every post source must implement.
///
/// `stream_posts()` is called once per monitored subreddit.  Calling it twice
/// with the same name must produce two independent streams.
///
/// ## Implementing a new provider
///
/// ```ignore
/// pub struct MyProvider;
///
/// impl StreamProvider for MyProvider {
///     type Post = MyPost;
///     type Error = MyError;
///
///     fn stream_posts(&self, subreddit: &str) -> Result<PostStream<MyPost, MyError>, MyError> {
///         let (posts_tx, posts) = mpsc::unbounded_channel();
///         let (errors_tx, errors) = mpsc::unbounded_channel();
///         // Hand posts_tx / errors_tx to a background task here.
///         Ok(PostStream { posts, errors, stop: StopHandle::new(move || { /* ... */ }) })
///     }
/// }
/// ```
pub trait StreamProvider {
    /// The record delivered for each new post.
    type Post: Send + 'static;

    /// Errors surfaced while opening or running a stream.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a stream of new posts for `subreddit`.
    ///
    /// An `Err` means the name was rejected up front and nothing was started.
    fn stream_posts(
        &self,
        subreddit: &str,
    ) -> Result<PostStream<Self::Post, Self::Error>, Self::Error>;
}

/// The producers and teardown handle for one open stream.
pub struct PostStream<P, E> {
    /// New posts, in the order the provider observed them.
    pub posts: mpsc::UnboundedReceiver<P>,
    /// Transport errors.  Never fatal to the stream.
    pub errors: mpsc::UnboundedReceiver<E>,
    /// Requests that the provider close both producers.
    pub stop: StopHandle,
}

/// A one-shot request to tear a stream down.
///
/// [`stop()`](StopHandle::stop) consumes the handle, so it can run at most once.
pub struct StopHandle(Box<dyn FnOnce() + Send>);

impl StopHandle {
    /// Wrap a teardown closure.
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A handle that does nothing when invoked.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Invoke the teardown.
    pub fn stop(self) {
        (self.0)()
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StopHandle")
    }
}

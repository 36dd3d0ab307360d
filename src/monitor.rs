//! Fan-in of per-subreddit streams into a single post callback.
//!
//! [`Monitor::monitor_posts`] opens one stream per subreddit through a
//! [`StreamProvider`] and spawns two tokio tasks for each:
//!
//! * a **post task** that drains the post producer and calls `on_post` for
//!   every item, in the order the provider produced them;
//! * an **error task** that drains the error producer and logs each item.
//!
//! Tasks for different subreddits run independently, so callbacks from two
//! subreddits may interleave in any order or run at the same time.  Errors
//! never stop post delivery.
//!
//! The returned [`StopAll`] stops every stream at once.  Once a provider
//! closes its producers the forwarding tasks drain what is left and exit;
//! [`StopAll::join`] waits for that.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stream::{PostStream, StopHandle, StreamProvider};

/// Errors returned by [`Monitor::monitor_posts`].
#[derive(Debug, Error)]
pub enum MonitorError<E>
where
    E: std::error::Error + 'static,
{
    /// The provider refused to open a stream for this subreddit.
    #[error("failed to open stream for r/{subreddit}")]
    Open {
        /// The subreddit name as passed in.
        subreddit: String,
        /// The provider's reason.
        #[source]
        source: E,
    },
}

/// Watches a set of subreddits through a [`StreamProvider`].
pub struct Monitor<P> {
    provider: P,
}

impl<P: StreamProvider> Monitor<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Start monitoring `subreddits`, calling `on_post` for each new post.
    ///
    /// Duplicate names are not merged: each occurrence gets its own stream.
    /// An empty slice starts nothing and returns a [`StopAll`] whose `stop()`
    /// does nothing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::Open`] if the provider rejects a subreddit.
    /// Streams opened before the rejected one are stopped first.
    pub fn monitor_posts<S, F>(
        &self,
        subreddits: &[S],
        on_post: F,
    ) -> Result<StopAll, MonitorError<P::Error>>
    where
        S: AsRef<str>,
        F: Fn(P::Post) + Send + Sync + 'static,
    {
        let on_post = Arc::new(on_post);
        let mut subscriptions = Vec::with_capacity(subreddits.len());

        for subreddit in subreddits {
            let subreddit = subreddit.as_ref();
            match self.provider.stream_posts(subreddit) {
                Ok(stream) => {
                    debug!(subreddit, "stream opened");
                    let on_post = Arc::clone(&on_post);
                    subscriptions.push(Subscription::spawn(subreddit, stream, on_post));
                }
                Err(source) => {
                    StopAll::new(subscriptions).stop();
                    return Err(MonitorError::Open {
                        subreddit: subreddit.to_string(),
                        source,
                    });
                }
            }
        }

        info!(count = subscriptions.len(), "monitoring started");
        Ok(StopAll::new(subscriptions))
    }
}

/// One monitored subreddit: its stop handle and its two forwarding tasks.
struct Subscription {
    subreddit: String,
    /// `None` once stopped.
    stop: Option<StopHandle>,
    tasks: [JoinHandle<()>; 2],
}

impl Subscription {
    fn spawn<T, E, F>(subreddit: &str, stream: PostStream<T, E>, on_post: Arc<F>) -> Self
    where
        T: Send + 'static,
        E: std::error::Error + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let PostStream {
            mut posts,
            mut errors,
            stop,
        } = stream;

        let name = subreddit.to_string();
        let posts_task = tokio::spawn(async move {
            while let Some(post) = posts.recv().await {
                on_post(post);
            }
            debug!(subreddit = %name, "post stream closed");
        });

        let name = subreddit.to_string();
        let errors_task = tokio::spawn(async move {
            while let Some(err) = errors.recv().await {
                warn!(subreddit = %name, error = %err, "stream error");
            }
            debug!(subreddit = %name, "error stream closed");
        });

        Self {
            subreddit: subreddit.to_string(),
            stop: Some(stop),
            tasks: [posts_task, errors_task],
        }
    }
}

/// Aggregate stop handle returned by [`Monitor::monitor_posts`].
///
/// Dropping it does not stop anything; the streams keep running with no way
/// left to stop them.
#[must_use = "dropping a StopAll leaves its streams running with no way to stop them"]
pub struct StopAll {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl StopAll {
    fn new(subscriptions: Vec<Subscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop every stream.  Each stop handle runs exactly once; later calls
    /// are no-ops.
    pub fn stop(&self) {
        let mut stopped = 0usize;
        for sub in self.lock().iter_mut() {
            if let Some(stop) = sub.stop.take() {
                debug!(subreddit = %sub.subreddit, "stopping stream");
                stop.stop();
                stopped += 1;
            }
        }
        if stopped > 0 {
            info!(count = stopped, "monitoring stopped");
        }
    }

    /// Whether [`stop()`](StopAll::stop) has run for every subscription.
    pub fn is_stopped(&self) -> bool {
        self.lock().iter().all(|sub| sub.stop.is_none())
    }

    /// Number of monitored subreddits, counting duplicates.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of forwarding tasks started (two per subreddit).
    pub fn task_count(&self) -> usize {
        self.lock().iter().map(|sub| sub.tasks.len()).sum()
    }

    /// Monitored subreddit names, in the order they were opened.
    pub fn subreddits(&self) -> Vec<String> {
        self.lock().iter().map(|sub| sub.subreddit.clone()).collect()
    }

    /// Wait for every forwarding task to drain its producer and exit.
    ///
    /// Stop handles that were never invoked are kept alive until all tasks
    /// have finished, so without a prior [`stop()`](StopAll::stop) this only
    /// returns once the provider closes its streams by itself.
    pub async fn join(self) {
        let subscriptions = self
            .subscriptions
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        let mut pending_stops = Vec::new();
        for Subscription {
            subreddit,
            stop,
            tasks,
        } in subscriptions
        {
            pending_stops.push(stop);
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(subreddit = %subreddit, error = %e, "forwarding task failed");
                }
            }
        }
        drop(pending_stops);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    struct TestPost {
        subreddit: String,
        title: String,
        created: DateTime<Utc>,
    }

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct TestError(Arc<str>);

    #[derive(Default, Clone)]
    struct Script {
        posts: Vec<TestPost>,
        errors: Vec<Arc<str>>,
        /// Close both producers right away instead of waiting for stop.
        exhausted: bool,
    }

    /// In-memory provider that replays a fixed script per subreddit.
    #[derive(Default)]
    struct FakeProvider {
        scripts: HashMap<String, Script>,
        stops: Arc<Mutex<HashMap<String, usize>>>,
    }

    impl FakeProvider {
        fn script(mut self, subreddit: &str, titles: &[&str], errors: &[&str]) -> Self {
            let posts = titles
                .iter()
                .map(|title| make_post(subreddit, title, ts()))
                .collect();
            self.scripts.insert(
                subreddit.to_string(),
                Script {
                    posts,
                    errors: errors.iter().map(|e| Arc::from(*e)).collect(),
                    exhausted: false,
                },
            );
            self
        }

        fn exhausted(mut self, subreddit: &str, titles: &[&str]) -> Self {
            self = self.script(subreddit, titles, &[]);
            if let Some(script) = self.scripts.get_mut(subreddit) {
                script.exhausted = true;
            }
            self
        }

        fn stop_count(&self, subreddit: &str) -> usize {
            self.stops.lock().unwrap().get(subreddit).copied().unwrap_or(0)
        }
    }

    impl StreamProvider for FakeProvider {
        type Post = TestPost;
        type Error = TestError;

        fn stream_posts(
            &self,
            subreddit: &str,
        ) -> Result<PostStream<TestPost, TestError>, TestError> {
            if subreddit.is_empty() {
                return Err(TestError("empty subreddit name".into()));
            }

            let (posts_tx, posts) = mpsc::unbounded_channel();
            let (errors_tx, errors) = mpsc::unbounded_channel();
            let script = self.scripts.get(subreddit).cloned().unwrap_or_default();
            for post in script.posts {
                posts_tx.send(post).unwrap();
            }
            for err in script.errors {
                errors_tx.send(TestError(err)).unwrap();
            }

            let stops = Arc::clone(&self.stops);
            let name = subreddit.to_string();
            let senders = (!script.exhausted).then_some((posts_tx, errors_tx));
            let stop = StopHandle::new(move || {
                *stops.lock().unwrap().entry(name).or_default() += 1;
                drop(senders);
            });

            Ok(PostStream { posts, errors, stop })
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 1, 12, 0, 0).unwrap()
    }

    fn make_post(subreddit: &str, title: &str, created: DateTime<Utc>) -> TestPost {
        TestPost {
            subreddit: subreddit.to_string(),
            title: title.to_string(),
            created,
        }
    }

    /// Start monitoring and record every callback invocation.
    fn collect(
        monitor: &Monitor<FakeProvider>,
        subreddits: &[&str],
    ) -> (StopAll, Arc<Mutex<Vec<TestPost>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let stop_all = monitor
            .monitor_posts(subreddits, move |post| sink.lock().unwrap().push(post))
            .unwrap();
        (stop_all, seen)
    }

    fn titles_for(posts: &[TestPost], subreddit: &str) -> Vec<String> {
        posts
            .iter()
            .filter(|p| p.subreddit == subreddit)
            .map(|p| p.title.clone())
            .collect()
    }

    #[tokio::test]
    async fn starts_two_tasks_per_channel() {
        let mut provider = FakeProvider::default();
        for name in ["a", "b", "c"] {
            let post = format!("{name}-post");
            let error = format!("{name}-error");
            provider = provider.script(name, &[post.as_str()], &[error.as_str()]);
        }
        let scripted_errors: Vec<Arc<str>> = ["a", "b", "c"]
            .iter()
            .map(|name| Arc::clone(&provider.scripts[*name].errors[0]))
            .collect();
        let monitor = Monitor::new(provider);
        let (stop_all, seen) = collect(&monitor, &["a", "b", "c"]);

        assert_eq!(stop_all.channel_count(), 3);
        assert_eq!(stop_all.task_count(), 6);
        assert_eq!(stop_all.subreddits(), vec!["a", "b", "c"]);

        stop_all.stop();
        tokio::time::timeout(Duration::from_secs(5), stop_all.join())
            .await
            .expect("forwarding tasks did not finish");

        let seen = seen.lock().unwrap();
        for name in ["a", "b", "c"] {
            assert_eq!(titles_for(&seen, name), vec![format!("{name}-post")]);
        }
        // Only the script and this test still hold each error, so the error
        // task received it and let it go.
        for error in &scripted_errors {
            assert_eq!(Arc::strong_count(error), 2);
        }
    }

    #[tokio::test]
    async fn delivers_posts_in_order_within_a_channel() {
        let monitor = Monitor::new(FakeProvider::default().script("a", &["p1", "p2", "p3"], &[]));
        let (stop_all, seen) = collect(&monitor, &["a"]);

        stop_all.stop();
        stop_all.join().await;

        assert_eq!(titles_for(&seen.lock().unwrap(), "a"), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn channels_are_independent() {
        let provider = FakeProvider::default()
            .script("a", &["a1", "a2"], &[])
            .script("b", &["b1", "b2"], &[]);
        let monitor = Monitor::new(provider);
        let (stop_all, seen) = collect(&monitor, &["a", "b"]);

        stop_all.stop();
        stop_all.join().await;

        // Only per-channel order is guaranteed.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(titles_for(&seen, "a"), vec!["a1", "a2"]);
        assert_eq!(titles_for(&seen, "b"), vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn stop_calls_each_handle_once_and_is_idempotent() {
        let monitor = Monitor::new(FakeProvider::default());
        let (stop_all, _) = collect(&monitor, &["a", "b"]);
        assert!(!stop_all.is_stopped());

        stop_all.stop();
        stop_all.stop();

        assert!(stop_all.is_stopped());
        assert_eq!(monitor.provider().stop_count("a"), 1);
        assert_eq!(monitor.provider().stop_count("b"), 1);
        stop_all.join().await;
    }

    #[tokio::test]
    async fn duplicate_names_get_independent_subscriptions() {
        let monitor = Monitor::new(FakeProvider::default().script("a", &["p1"], &[]));
        let (stop_all, seen) = collect(&monitor, &["a", "a"]);
        assert_eq!(stop_all.channel_count(), 2);

        stop_all.stop();
        stop_all.join().await;

        assert_eq!(monitor.provider().stop_count("a"), 2);
        assert_eq!(titles_for(&seen.lock().unwrap(), "a"), vec!["p1", "p1"]);
    }

    #[tokio::test]
    async fn errors_do_not_interrupt_posts() {
        let monitor = Monitor::new(FakeProvider::default().script("a", &["p1"], &["e1", "e2"]));
        let (stop_all, seen) = collect(&monitor, &["a"]);

        stop_all.stop();
        stop_all.join().await;

        assert_eq!(titles_for(&seen.lock().unwrap(), "a"), vec!["p1"]);
    }

    #[tokio::test]
    async fn single_synthetic_post_reaches_callback() {
        let monitor =
            Monitor::new(FakeProvider::default().script("testingground4bots", &["hello"], &[]));
        let (stop_all, seen) = collect(&monitor, &["testingground4bots"]);

        stop_all.stop();
        stop_all.join().await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].title, "hello");
        assert_eq!(seen[0].created, ts());
    }

    #[tokio::test]
    async fn empty_channel_set_starts_nothing() {
        let monitor = Monitor::new(FakeProvider::default());
        let (stop_all, seen) = collect(&monitor, &[]);

        assert_eq!(stop_all.channel_count(), 0);
        assert_eq!(stop_all.task_count(), 0);
        stop_all.stop();
        assert!(stop_all.is_stopped());
        stop_all.join().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_channel_stops_already_opened_ones() {
        let monitor = Monitor::new(FakeProvider::default());
        let result = monitor.monitor_posts(&["a", "", "b"], |_| {});

        match result {
            Err(MonitorError::Open { subreddit, source }) => {
                assert_eq!(subreddit, "");
                assert_eq!(source.to_string(), "empty subreddit name");
            }
            Ok(_) => panic!("expected the empty name to be rejected"),
        }
        assert_eq!(monitor.provider().stop_count("a"), 1);
        assert_eq!(monitor.provider().stop_count("b"), 0);
    }

    #[tokio::test]
    async fn exhausted_stream_lets_join_finish_without_stop() {
        let monitor = Monitor::new(FakeProvider::default().exhausted("a", &["p1", "p2"]));
        let (stop_all, seen) = collect(&monitor, &["a"]);

        tokio::time::timeout(Duration::from_secs(5), stop_all.join())
            .await
            .expect("forwarding tasks should exit once the provider closes");

        assert_eq!(titles_for(&seen.lock().unwrap(), "a"), vec!["p1", "p2"]);
        assert_eq!(monitor.provider().stop_count("a"), 0);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_break_join() {
        let monitor = Monitor::new(FakeProvider::default().script("a", &["boom"], &[]));
        let stop_all = monitor
            .monitor_posts(&["a"], |_| panic!("callback failure"))
            .unwrap();

        stop_all.stop();
        stop_all.join().await;
    }
}

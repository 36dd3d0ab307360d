//! reddit-monitor — watch subreddits for new posts.
//!
//! ## Architecture overview
//!
//! ```text
//!                 stream_posts()          posts / errors
//! ┌────────────┐ ───────────────► ┌────────────────┐ ───────────► ┌────────────┐
//! │ monitor.rs │                  │ reddit/        │  (mpsc, one  │ monitor.rs │
//! │ (Monitor)  │ ◄─────────────── │ (RedditStream) │   pair per   │ forwarding │
//! └────────────┘   PostStream     └────────────────┘   subreddit) │   tasks    │
//!                                                                 └────────────┘
//!                                                                       │ on_post(post)
//!                                                                       ▼
//!                                                                   callback
//! ```
//!
//! * **`stream`** — the `StreamProvider` trait every post source implements.
//! * **`monitor`** — opens one stream per subreddit and fans posts into a
//!   single callback; returns a `StopAll` handle.
//! * **`reddit`** — the Reddit client and its polling `StreamProvider`.
//! * **`config`** — reads credentials and options from the environment.
//! * **`logging`** — `tracing` subscriber setup.

pub mod config;
pub mod logging;
pub mod monitor;
pub mod reddit;
pub mod stream;

pub use monitor::{Monitor, MonitorError, StopAll};
pub use stream::{PostStream, StopHandle, StreamProvider};

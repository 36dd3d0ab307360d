//! Binary entry point: monitor the configured subreddits and print each new
//! post's title and creation time until interrupted.

use anyhow::{Context, Result};
use tracing::info;

use reddit_monitor::config::Config;
use reddit_monitor::logging;
use reddit_monitor::reddit::{Post, RedditClient, RedditStream};
use reddit_monitor::Monitor;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    // -- configuration and authentication ------------------------------------
    let config = Config::from_env().context("failed to load configuration")?;
    let client = RedditClient::connect(config.reddit.clone())
        .await
        .context("failed to authenticate with Reddit")?;

    if client.has_user_context() {
        let name = client.me().await.context("failed to look up account")?;
        info!(account = %name, "logged in");
    }

    // -- start monitoring ----------------------------------------------------
    info!(subreddits = %config.subreddits.join(", "), "monitoring subreddits");
    let monitor = Monitor::new(RedditStream::new(client, config.stream.clone()));
    let stop_all = monitor
        .monitor_posts(config.subreddits.as_slice(), |post: Post| {
            println!("found post {} {}", post.title, post.created);
        })
        .context("failed to start monitoring")?;

    // -- run until interrupted -----------------------------------------------
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("interrupted, shutting down");

    stop_all.stop();
    stop_all.join().await;
    Ok(())
}

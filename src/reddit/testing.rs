//! Shared fixtures for tests that talk to a mock Reddit server.

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::client::{Credentials, Grant, RedditClient, RedditConfig};

/// Build a `/new` listing body from `(id, title, created_utc)` triples,
/// in the order given (Reddit lists newest first).
pub fn listing(posts: &[(&str, &str, f64)]) -> Value {
    let children: Vec<Value> = posts
        .iter()
        .map(|(id, title, created)| {
            json!({
                "kind": "t3",
                "data": {
                    "id": id,
                    "name": format!("t3_{id}"),
                    "title": title,
                    "author": "tester",
                    "subreddit": "rust",
                    "created_utc": created,
                    "permalink": format!("/r/rust/comments/{id}/"),
                    "is_self": true,
                    "selftext": ""
                }
            })
        })
        .collect();

    json!({ "kind": "Listing", "data": { "after": null, "children": children } })
}

/// Mount a token endpoint that always hands out `tok`.
pub async fn mount_token(server: &MockServer, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": expires_in,
            "scope": "*"
        })))
        .mount(server)
        .await;
}

/// Config pointing both the auth and API base URLs at the mock server.
pub fn config_for(server: &MockServer, grant: Grant) -> RedditConfig {
    let mut config = RedditConfig::new(
        Credentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
            grant,
        },
        "rust:reddit-monitor:test",
    );
    config.auth_url = server.uri();
    config.api_url = server.uri();
    config
}

/// A client authenticated against the mock server with a password grant.
pub async fn connected_client(server: &MockServer) -> RedditClient {
    mount_token(server, 3600).await;
    let grant = Grant::Password {
        username: "bot".into(),
        password: "hunter2".into(),
    };
    RedditClient::connect(config_for(server, grant)).await.unwrap()
}

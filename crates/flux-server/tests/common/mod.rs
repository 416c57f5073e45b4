#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use flux_server::{app, config::Config, AppState};
use serde_json::{json, Value};
use tower::ServiceExt; // for oneshot

pub const FOLLOW: &str = "client:gravity:action:follow:user";
pub const UNFOLLOW: &str = "client:gravity:action:unfollow:user";
pub const POST: &str = "client:gravity:action:post:user";

pub fn follow_schema() -> Value {
    json!({
        "client:gravity:action:follow": [
            { "targets": ["[followee].followers"], "add": "follower" },
            { "targets": ["[follower].sources"], "add": "followee" }
        ],
        "client:gravity:action:unfollow": [
            { "targets": ["[followee].followers"], "remove": "follower" },
            { "targets": ["[follower].sources"], "remove": "followee" }
        ],
        "client:gravity:action:post": [
            { "targets": ["[user].followers.feed_items"], "add": "post" }
        ],
        "@relations": { "followers": "set", "sources": "set" }
    })
}

/// Follow and unfollow rules only; no relation kinds are declared and
/// posts travel through inline targets.
pub fn gravity_schema() -> Value {
    json!({
        "client:gravity:action:follow": [
            { "targets": ["[followee].followers"], "add": "follower" },
            { "targets": ["[follower].sources"], "add": "followee" }
        ],
        "client:gravity:action:unfollow": [
            { "targets": ["[followee].followers"], "remove": "follower" },
            { "targets": ["[follower].sources"], "remove": "followee" }
        ]
    })
}

pub fn memory_app() -> Router {
    app(AppState::in_memory(&Config::default()))
}

pub fn app_with(config: &Config) -> Router {
    app(AppState::from_config(config).expect("state should build"))
}

/// Sends one request and returns the status plus the decoded JSON body.
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub async fn register(app: &Router, schema: Value) -> String {
    let (status, body) = send(app, Method::POST, "/schema", Some(schema)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["id"].as_str().unwrap().to_string()
}

pub async fn submit(app: &Router, schema_id: &str, events: Value) -> Value {
    let uri = format!("/schema/{schema_id}/events");
    let (status, body) = send(app, Method::POST, &uri, Some(events)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["failures"], json!([]), "{body}");
    body
}

pub async fn query(app: &Router, key: &str) -> Vec<String> {
    let uri = format!("/query?keys%5B%5D={key}&max_results=10");
    let (status, body) = send(app, Method::GET, &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    serde_json::from_value(body["results"].clone()).unwrap()
}

pub fn follow(follower: &str, followee: &str) -> Value {
    json!([FOLLOW, { "follower": follower, "followee": followee }])
}

pub fn unfollow(follower: &str, followee: &str) -> Value {
    json!([UNFOLLOW, { "follower": follower, "followee": followee }])
}

pub fn post(user: &str, post: &str) -> Value {
    json!([POST, { "user": user, "post": post }])
}

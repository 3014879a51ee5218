use std::str::FromStr;

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use linkup_api::{build_router, AppState};
use linkup_auth::{Authenticator, IdentityProfile};
use linkup_config::AppConfig;
use linkup_live::{LiveEvent, LiveHub};
use serde_json::{json, Value};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tower::ServiceExt;

type TestResult<T = ()> = anyhow::Result<T>;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

struct TestContext {
    _temp_dir: TempDir,
    pool: SqlitePool,
    state: AppState,
}

impl TestContext {
    async fn new() -> TestResult<Self> {
        Self::with_config(AppConfig::default()).await
    }

    async fn with_config(config: AppConfig) -> TestResult<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("linkup_api.sqlite");
        let db_url = format!("sqlite://{}", db_path.display());

        let mut options = SqliteConnectOptions::from_str(&db_url)?;
        options = options.create_if_missing(true);
        options = options.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;

        let authenticator = Authenticator::new(pool.clone(), config.auth.clone());
        let hub = LiveHub::new(config.live.channel_capacity);
        let state = AppState::new(pool.clone(), authenticator, hub, &config);

        Ok(Self {
            _temp_dir: temp_dir,
            pool,
            state,
        })
    }

    fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Seed a user and cache `token` for it, as a verified provider token
    /// would be. Returns the user's public id.
    async fn sign_in(&self, token: &str, username: &str) -> TestResult<String> {
        let profile = IdentityProfile {
            id: format!("idp_{username}"),
            email: Some(format!("{username}@example.com")),
            username: Some(username.to_string()),
            full_name: Some(format!("User {username}")),
            image_url: None,
        };
        let (user, _) = self
            .state
            .authenticator()
            .authenticate_with_profile(token, profile)
            .await?;
        Ok(user.public_id)
    }

    async fn get(&self, uri: &str, token: &str) -> TestResult<(StatusCode, Value)> {
        let request = Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())?;
        send(self.router(), request).await
    }

    async fn post_json(
        &self,
        uri: &str,
        token: &str,
        body: Value,
    ) -> TestResult<(StatusCode, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))?;
        send(self.router(), request).await
    }

    async fn send_multipart(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
    ) -> TestResult<(StatusCode, Value)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields)))?;
        send(self.router(), request).await
    }
}

async fn send(router: Router, request: Request<Body>) -> TestResult<(StatusCode, Value)> {
    let response = router.oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

fn multipart_body(fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

#[tokio::test]
async fn health_check_works() -> TestResult {
    let ctx = TestContext::new().await?;
    let request = Request::builder().uri("/health").body(Body::empty())?;
    let (status, body) = send(ctx.router(), request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn current_user_requires_authentication() -> TestResult {
    let ctx = TestContext::new().await?;
    let request = Request::builder()
        .uri("/api/users/me")
        .body(Body::empty())?;
    let (status, body) = send(ctx.router(), request).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("authorization"));
    Ok(())
}

#[tokio::test]
async fn current_user_returns_synced_profile() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;

    let (status, body) = ctx.get("/api/users/me", "token-alice").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], alice);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["email"], "alice@example.com");
    Ok(())
}

#[tokio::test]
async fn profile_update_changes_given_fields_only() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;

    let (status, body) = ctx
        .send_multipart(
            "PATCH",
            "/api/users/me",
            "token-alice",
            &[("bio", "hello world"), ("location", "Paris")],
        )
        .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["bio"], "hello world");
    assert_eq!(body["user"]["location"], "Paris");
    assert_eq!(body["user"]["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn profile_update_rejects_taken_username() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;
    ctx.sign_in("token-bob", "bob").await?;

    let (status, body) = ctx
        .send_multipart("PATCH", "/api/users/me", "token-bob", &[("username", "alice")])
        .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("taken"));
    Ok(())
}

#[tokio::test]
async fn discover_matches_and_excludes_self() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bobalice").await?;

    let (status, body) = ctx
        .get("/api/users/discover?q=alice", "token-alice")
        .await?;

    assert_eq!(status, StatusCode::OK);
    let users = body["users"].as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], bob);
    Ok(())
}

#[tokio::test]
async fn follow_shows_up_in_connection_lists() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;

    let (status, _) = ctx
        .post_json("/api/users/follow", "token-alice", json!({ "user_id": bob }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = ctx.get("/api/users/connections", "token-alice").await?;
    let following = body["following"].as_array().unwrap();
    assert_eq!(following.len(), 1);
    assert_eq!(following[0]["id"], bob);

    let (_, body) = ctx.get("/api/users/connections", "token-bob").await?;
    let followers = body["followers"].as_array().unwrap();
    assert_eq!(followers.len(), 1);
    assert_eq!(followers[0]["id"], alice);
    Ok(())
}

#[tokio::test]
async fn following_yourself_is_rejected() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;

    let (status, _) = ctx
        .post_json("/api/users/follow", "token-alice", json!({ "user_id": alice }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn connection_request_and_accept_flow() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;

    let (status, _) = ctx
        .post_json("/api/users/connect", "token-alice", json!({ "user_id": bob }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    // A second request in either direction is rejected while pending.
    let (status, _) = ctx
        .post_json("/api/users/connect", "token-bob", json!({ "user_id": alice }))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = ctx.get("/api/users/connections", "token-bob").await?;
    let pending = body["pending_requests"].as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["id"], alice);

    let (status, _) = ctx
        .post_json("/api/users/accept", "token-bob", json!({ "user_id": alice }))
        .await?;
    assert_eq!(status, StatusCode::OK);

    for token in ["token-alice", "token-bob"] {
        let (_, body) = ctx.get("/api/users/connections", token).await?;
        assert_eq!(body["connections"].as_array().unwrap().len(), 1);
        assert!(body["pending_requests"].as_array().unwrap().is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn accepting_without_request_is_not_found() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    ctx.sign_in("token-bob", "bob").await?;

    let (status, _) = ctx
        .post_json("/api/users/accept", "token-bob", json!({ "user_id": alice }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn feed_covers_self_followed_and_connected_users() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;
    ctx.sign_in("token-carol", "carol").await?;

    let (status, body) = ctx
        .send_multipart(
            "POST",
            "/api/posts",
            "token-alice",
            &[("content", "first post")],
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["content"], "first post");
    assert_eq!(body["post"]["post_type"], "text");
    assert_eq!(body["post"]["author"]["id"], alice);

    // Bob follows alice and sees her post; carol does not.
    ctx.post_json("/api/users/follow", "token-bob", json!({ "user_id": alice }))
        .await?;

    let (_, body) = ctx.get("/api/posts/feed", "token-bob").await?;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    let (_, body) = ctx.get("/api/posts/feed", "token-carol").await?;
    assert!(body["posts"].as_array().unwrap().is_empty());

    // Connections see posts too: carol connects with alice.
    ctx.post_json("/api/users/connect", "token-carol", json!({ "user_id": alice }))
        .await?;
    ctx.post_json("/api/users/accept", "token-alice", json!({ "user_id": ctx.public_id("carol").await? }))
        .await?;

    let (_, body) = ctx.get("/api/posts/feed", "token-carol").await?;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    let _ = bob;
    Ok(())
}

#[tokio::test]
async fn likes_toggle_on_and_off() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;

    let (_, body) = ctx
        .send_multipart("POST", "/api/posts", "token-alice", &[("content", "likeable")])
        .await?;
    let post_id = body["post"]["id"].as_str().unwrap().to_string();

    let (status, body) = ctx
        .post_json("/api/posts/like", "token-alice", json!({ "post_id": post_id }))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["liked"], true);
    assert_eq!(body["likes_count"], 1);
    assert_eq!(body["message"], "Post liked");

    let (_, body) = ctx
        .post_json("/api/posts/like", "token-alice", json!({ "post_id": post_id }))
        .await?;
    assert_eq!(body["liked"], false);
    assert_eq!(body["likes_count"], 0);
    assert_eq!(body["message"], "Post unliked");
    Ok(())
}

#[tokio::test]
async fn liking_missing_post_is_not_found() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;

    let (status, _) = ctx
        .post_json("/api/posts/like", "token-alice", json!({ "post_id": "missing" }))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn messages_round_trip_through_history() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;

    let (status, body) = ctx
        .send_multipart(
            "POST",
            "/api/messages/send",
            "token-alice",
            &[("to_user_id", bob.as_str()), ("content", "hello bob")],
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"]["from_user_id"], alice);
    assert_eq!(body["message"]["to_user_id"], bob);

    ctx.send_multipart(
        "POST",
        "/api/messages/send",
        "token-bob",
        &[("to_user_id", alice.as_str()), ("content", "hi alice")],
    )
    .await?;

    // Both directions appear, oldest first, from either side.
    let (_, body) = ctx
        .get(&format!("/api/messages/{bob}"), "token-alice")
        .await?;
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "hello bob");
    assert_eq!(messages[1]["content"], "hi alice");

    let (_, body) = ctx
        .get(&format!("/api/messages/{alice}"), "token-bob")
        .await?;
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn empty_message_is_rejected() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;

    let (status, _) = ctx
        .send_multipart(
            "POST",
            "/api/messages/send",
            "token-alice",
            &[("to_user_id", bob.as_str()), ("content", "   ")],
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn recent_conversations_keep_latest_message_per_peer() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;
    let carol = ctx.sign_in("token-carol", "carol").await?;

    for (token, to, content) in [
        ("token-alice", &bob, "to bob 1"),
        ("token-alice", &carol, "to carol"),
        ("token-bob", &alice, "to alice latest"),
    ] {
        ctx.send_multipart(
            "POST",
            "/api/messages/send",
            token,
            &[("to_user_id", to.as_str()), ("content", content)],
        )
        .await?;
    }

    let (_, body) = ctx.get("/api/messages/recent", "token-alice").await?;
    let conversations = body["conversations"].as_array().unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0]["content"], "to alice latest");
    assert_eq!(conversations[1]["content"], "to carol");
    Ok(())
}

#[tokio::test]
async fn sending_a_message_publishes_to_recipients_live_channel() -> TestResult {
    let ctx = TestContext::new().await?;
    let alice = ctx.sign_in("token-alice", "alice").await?;
    let bob = ctx.sign_in("token-bob", "bob").await?;

    let mut stream = ctx.state.hub().subscribe(&bob).await;

    ctx.send_multipart(
        "POST",
        "/api/messages/send",
        "token-alice",
        &[("to_user_id", bob.as_str()), ("content", "live hello")],
    )
    .await?;

    let LiveEvent::Message { message } = stream.recv().await?;
    assert_eq!(message.from_user_id, alice);
    assert_eq!(message.to_user_id, bob);
    assert_eq!(message.content, "live hello");
    Ok(())
}

#[tokio::test]
async fn message_stream_opens_for_authenticated_user() -> TestResult {
    let ctx = TestContext::new().await?;
    ctx.sign_in("token-alice", "alice").await?;

    let request = Request::builder()
        .uri("/api/messages/stream?token=token-alice")
        .body(Body::empty())?;
    let response = ctx.router().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));
    Ok(())
}

#[tokio::test]
async fn message_stream_rejects_missing_token() -> TestResult {
    let ctx = TestContext::new().await?;

    let request = Request::builder()
        .uri("/api/messages/stream")
        .body(Body::empty())?;
    let response = ctx.router().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn webhook_acknowledges_user_events_without_engine() -> TestResult {
    let ctx = TestContext::new().await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/identity")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "type": "user.created", "data": { "id": "idp_new" } }).to_string(),
        ))?;
    let (status, body) = send(ctx.router(), request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "event relayed to workflow engine");
    Ok(())
}

#[tokio::test]
async fn webhook_acknowledges_unhandled_event_types() -> TestResult {
    let ctx = TestContext::new().await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/identity")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "type": "session.created", "data": {} }).to_string(),
        ))?;
    let (status, body) = send(ctx.router(), request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "event received but not handled");
    Ok(())
}

#[tokio::test]
async fn webhook_with_secret_rejects_unsigned_requests() -> TestResult {
    let mut config = AppConfig::default();
    config.webhook.signing_secret = Some("whsec_c2VjcmV0LWtleQ==".to_string());
    let ctx = TestContext::with_config(config).await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/identity")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "type": "user.created", "data": {} }).to_string()))?;
    let (status, body) = send(ctx.router(), request).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("missing webhook signature headers"));
    Ok(())
}

impl TestContext {
    async fn public_id(&self, username: &str) -> TestResult<String> {
        let id: String = sqlx::query_scalar("SELECT public_id FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }
}

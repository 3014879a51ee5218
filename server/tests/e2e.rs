//! End-to-end smoke test: database bootstrap, auth sync, posting,
//! messaging, and live delivery wired together the way the binary does it.

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use linkup_api::{build_router, AppState};
use linkup_auth::{Authenticator, IdentityProfile};
use linkup_config::AppConfig;
use linkup_live::{LiveEvent, LiveHub};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "e2e-boundary-Xb91c";

struct TestApp {
    router: Router,
    state: AppState,
    _db_dir: TempDir,
}

impl TestApp {
    async fn new() -> anyhow::Result<Self> {
        let db_dir = TempDir::new()?;
        let db_path = db_dir.path().join("linkup-e2e.db");

        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", db_path.to_string_lossy());
        config.database.max_connections = 5;

        let db_pool = linkup_database::initialize_database(&config.database).await?;
        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let hub = LiveHub::new(config.live.channel_capacity);
        let state = AppState::new(db_pool, authenticator, hub, &config);
        let router = build_router(state.clone());

        Ok(Self {
            router,
            state,
            _db_dir: db_dir,
        })
    }

    async fn sign_in(&self, token: &str, username: &str) -> anyhow::Result<String> {
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

    async fn request(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: Option<Body>,
        content_type: Option<String>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"));
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        let request = builder.body(body.unwrap_or_else(Body::empty))?;

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = response.into_body().collect().await?.to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    async fn post_multipart(
        &self,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, Value)> {
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

        self.request(
            "POST",
            uri,
            token,
            Some(Body::from(body)),
            Some(format!("multipart/form-data; boundary={BOUNDARY}")),
        )
        .await
    }
}

#[tokio::test]
async fn full_social_flow_works_end_to_end() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let alice = app.sign_in("token-alice", "alice").await?;
    let bob = app.sign_in("token-bob", "bob").await?;

    // Alice posts, bob follows her and sees the post in his feed.
    let (status, body) = app
        .post_multipart("/api/posts", "token-alice", &[("content", "hello world")])
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["post"]["author"]["id"], alice);

    let (status, _) = app
        .request(
            "POST",
            "/api/users/follow",
            "token-bob",
            Some(Body::from(json!({ "user_id": alice }).to_string())),
            Some("application/json".to_string()),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.request("GET", "/api/posts/feed", "token-bob", None, None).await?;
    assert_eq!(body["posts"].as_array().unwrap().len(), 1);

    // Bob opens his live stream; alice's message arrives on it and in history.
    let mut live = app.state.hub().subscribe(&bob).await;

    let (status, _) = app
        .post_multipart(
            "/api/messages/send",
            "token-alice",
            &[("to_user_id", bob.as_str()), ("content", "hey bob")],
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let LiveEvent::Message { message } = live.recv().await?;
    assert_eq!(message.from_user_id, alice);
    assert_eq!(message.content, "hey bob");

    let (_, body) = app
        .request(
            "GET",
            &format!("/api/messages/{alice}"),
            "token-bob",
            None,
            None,
        )
        .await?;
    assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    Ok(())
}

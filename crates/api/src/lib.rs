mod docs;
mod error;
mod media;
mod relay;
mod state;
mod util;

pub mod routes;

pub use error::{ApiError, ErrorResponse};
pub use media::MediaClient;
pub use relay::EngineRelay;
pub use state::AppState;

use axum::{
    http::header::{AUTHORIZATION, CONTENT_TYPE},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        // User routes
        .route(
            "/api/users/me",
            get(routes::users::get_current_user).patch(routes::users::update_current_user),
        )
        .route("/api/users/discover", get(routes::users::discover_users))
        .route(
            "/api/users/connections",
            get(routes::users::list_connections),
        )
        .route("/api/users/follow", post(routes::users::follow_user))
        .route("/api/users/unfollow", post(routes::users::unfollow_user))
        .route("/api/users/connect", post(routes::users::request_connection))
        .route("/api/users/accept", post(routes::users::accept_connection))
        .route("/api/users/:user_id", get(routes::users::get_user_profile))
        // Post routes
        .route("/api/posts", post(routes::posts::create_post))
        .route("/api/posts/feed", get(routes::posts::get_feed))
        .route("/api/posts/like", post(routes::posts::like_post))
        // Message routes
        .route("/api/messages/send", post(routes::messages::send_message))
        .route(
            "/api/messages/recent",
            get(routes::messages::recent_conversations),
        )
        .route("/api/messages/stream", get(routes::stream::message_stream))
        .route(
            "/api/messages/:user_id",
            get(routes::messages::get_conversation),
        )
        // Webhook relay
        .route(
            "/api/webhooks/identity",
            post(routes::webhooks::identity_webhook),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", docs::ApiDoc::openapi()))
        .with_state(state)
        .layer(cors_layer())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
}

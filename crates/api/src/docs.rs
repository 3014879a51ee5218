use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::users::get_current_user,
        crate::routes::users::update_current_user,
        crate::routes::users::discover_users,
        crate::routes::users::list_connections,
        crate::routes::users::follow_user,
        crate::routes::users::unfollow_user,
        crate::routes::users::request_connection,
        crate::routes::users::accept_connection,
        crate::routes::users::get_user_profile,
        crate::routes::posts::create_post,
        crate::routes::posts::get_feed,
        crate::routes::posts::like_post,
        crate::routes::messages::send_message,
        crate::routes::messages::get_conversation,
        crate::routes::messages::recent_conversations,
        crate::routes::webhooks::identity_webhook
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::routes::health::HealthResponse,
            crate::routes::models::UserResponse,
            crate::routes::models::UserSummary,
            crate::routes::models::UserProfileResponse,
            crate::routes::models::UsersResponse,
            crate::routes::models::ConnectionsResponse,
            crate::routes::models::ProfileResponse,
            crate::routes::models::TargetUserRequest,
            crate::routes::models::AckResponse,
            crate::routes::models::PostAuthor,
            crate::routes::models::PostResponse,
            crate::routes::models::PostsResponse,
            crate::routes::models::PostCreatedResponse,
            crate::routes::models::LikeRequest,
            crate::routes::models::LikeResponse,
            crate::routes::models::Message,
            crate::routes::models::MessageResponse,
            crate::routes::models::MessagesResponse,
            crate::routes::models::ConversationsResponse,
            crate::routes::models::WebhookAck
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Users", description = "Profiles, discovery, and the social graph"),
        (name = "Posts", description = "Posts, feed, and likes"),
        (name = "Messages", description = "Direct messages and live delivery"),
        (name = "Webhooks", description = "Identity provider webhook relay")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearerAuth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

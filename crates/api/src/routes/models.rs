//! Wire models shared by the REST routes.

use linkup_live::MessagePayload;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: String,
    pub cover_photo: String,
}

impl From<linkup_auth::User> for UserResponse {
    fn from(user: linkup_auth::User) -> Self {
        Self {
            id: user.public_id,
            email: user.email,
            username: user.username,
            full_name: user.full_name,
            bio: user.bio,
            location: user.location,
            profile_picture: user.profile_picture,
            cover_photo: user.cover_photo,
        }
    }
}

/// Reduced user shape used in listings; queries alias `public_id AS id`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfileResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionsResponse {
    pub connections: Vec<UserSummary>,
    pub followers: Vec<UserSummary>,
    pub following: Vec<UserSummary>,
    pub pending_requests: Vec<UserSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub posts: Vec<PostResponse>,
    pub follower_count: i64,
    pub following_count: i64,
    pub connection_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TargetUserRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AckResponse {
    pub message: String,
}

/// Flat row produced by the post listing queries.
#[derive(Debug, sqlx::FromRow)]
pub struct PostRow {
    pub id: String,
    pub content: String,
    pub image_urls: String,
    pub post_type: String,
    pub created_at: String,
    pub author_id: String,
    pub author_username: String,
    pub author_full_name: String,
    pub author_profile_picture: String,
    pub likes_count: i64,
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PostAuthor {
    pub id: String,
    pub username: String,
    pub full_name: String,
    pub profile_picture: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PostResponse {
    pub id: String,
    pub content: String,
    pub image_urls: Vec<String>,
    pub post_type: String,
    pub created_at: String,
    pub likes_count: i64,
    pub liked_by_me: bool,
    pub author: PostAuthor,
}

impl From<PostRow> for PostResponse {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            image_urls: serde_json::from_str(&row.image_urls).unwrap_or_default(),
            post_type: row.post_type,
            created_at: row.created_at,
            likes_count: row.likes_count,
            liked_by_me: row.liked_by_me,
            author: PostAuthor {
                id: row.author_id,
                username: row.author_username,
                full_name: row.author_full_name,
                profile_picture: row.author_profile_picture,
            },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostsResponse {
    pub posts: Vec<PostResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostCreatedResponse {
    pub post: PostResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LikeRequest {
    pub post_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LikeResponse {
    pub liked: bool,
    pub likes_count: i64,
    pub message: String,
}

/// Direct message as stored and as pushed over the live channel; queries
/// alias the joined public identifiers.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Message {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub message_type: String,
    pub created_at: String,
}

impl From<Message> for MessagePayload {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            from_user_id: message.from_user_id,
            to_user_id: message.to_user_id,
            content: message.content,
            media_url: message.media_url,
            message_type: message.message_type,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: Message,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversationsResponse {
    pub conversations: Vec<Message>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

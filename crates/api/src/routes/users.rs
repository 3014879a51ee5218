use axum::{
    extract::{Multipart, Path, Query, State},
    http::HeaderMap,
    Json,
};
use linkup_auth::UpdateUserProfile;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    routes::models::{
        AckResponse, ConnectionsResponse, PostResponse, PostRow, ProfileResponse,
        TargetUserRequest, UserProfileResponse, UserSummary, UsersResponse,
    },
    util::require_bearer,
    ApiError, AppState,
};

const USER_SUMMARY_COLUMNS: &str =
    "u.public_id AS id, u.username, u.full_name, u.bio, u.location, u.profile_picture";

#[utoipa::path(
    get,
    path = "/api/users/me",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Current user profile", body = UserProfileResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    Ok(Json(UserProfileResponse { user: user.into() }))
}

#[utoipa::path(
    patch,
    path = "/api/users/me",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Updated user profile", body = UserProfileResponse),
        (status = 400, description = "Invalid profile payload", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_current_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UserProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let mut update = UpdateUserProfile::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "username" => update.username = Some(read_text(field).await?),
            "full_name" => update.full_name = Some(read_text(field).await?),
            "bio" => update.bio = Some(read_text(field).await?),
            "location" => update.location = Some(read_text(field).await?),
            "profile_picture" => {
                let file_name = field.file_name().unwrap_or("profile").to_string();
                let bytes = read_bytes(field).await?;
                let url = state.media().upload(&file_name, &bytes, "profiles").await?;
                update.profile_picture = Some(url);
            }
            "cover_photo" => {
                let file_name = field.file_name().unwrap_or("cover").to_string();
                let bytes = read_bytes(field).await?;
                let url = state.media().upload(&file_name, &bytes, "covers").await?;
                update.cover_photo = Some(url);
            }
            _ => {}
        }
    }

    if let Some(username) = &update.username {
        if username.trim().is_empty() {
            return Err(ApiError::bad_request("username must not be empty"));
        }

        let taken: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM users WHERE username = ? AND id != ?")
                .bind(username)
                .bind(user.id)
                .fetch_optional(state.db_pool())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to check username availability: {}", e);
                    ApiError::internal_server_error("Failed to check username availability")
                })?;

        if taken.is_some() {
            return Err(ApiError::bad_request("username is already taken"));
        }
    }

    let updated = state
        .authenticator()
        .update_user_profile(user.id, update)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(UserProfileResponse {
        user: updated.into(),
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DiscoverQuery {
    #[serde(default)]
    pub q: String,
}

#[utoipa::path(
    get,
    path = "/api/users/discover",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(DiscoverQuery),
    responses(
        (status = 200, description = "Users matching the search", body = UsersResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn discover_users(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
    headers: HeaderMap,
) -> Result<Json<UsersResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let needle = query.q.trim();
    if needle.is_empty() {
        return Ok(Json(UsersResponse { users: Vec::new() }));
    }

    let pattern = format!("%{needle}%");
    let users = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {USER_SUMMARY_COLUMNS}
        FROM users u
        WHERE u.id != ?
          AND (u.username LIKE ? OR u.full_name LIKE ? OR u.location LIKE ?)
        ORDER BY u.username ASC
        "#
    ))
    .bind(user.id)
    .bind(&pattern)
    .bind(&pattern)
    .bind(&pattern)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to search users: {}", e);
        ApiError::internal_server_error("Failed to search users")
    })?;

    Ok(Json(UsersResponse { users }))
}

#[utoipa::path(
    get,
    path = "/api/users/connections",
    tag = "Users",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Connections, followers, following, and pending requests", body = ConnectionsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_connections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let connections = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {USER_SUMMARY_COLUMNS}
        FROM users u
        JOIN connections c
          ON u.id = CASE WHEN c.requester_id = ?1 THEN c.recipient_id ELSE c.requester_id END
        WHERE c.status = 'accepted' AND (c.requester_id = ?1 OR c.recipient_id = ?1)
        ORDER BY u.username ASC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch connections: {}", e);
        ApiError::internal_server_error("Failed to fetch connections")
    })?;

    let followers = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {USER_SUMMARY_COLUMNS}
        FROM users u
        JOIN follows f ON f.follower_id = u.id
        WHERE f.followed_id = ?
        ORDER BY u.username ASC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch followers: {}", e);
        ApiError::internal_server_error("Failed to fetch followers")
    })?;

    let following = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {USER_SUMMARY_COLUMNS}
        FROM users u
        JOIN follows f ON f.followed_id = u.id
        WHERE f.follower_id = ?
        ORDER BY u.username ASC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch following: {}", e);
        ApiError::internal_server_error("Failed to fetch following")
    })?;

    let pending_requests = sqlx::query_as::<_, UserSummary>(&format!(
        r#"
        SELECT {USER_SUMMARY_COLUMNS}
        FROM users u
        JOIN connections c ON c.requester_id = u.id
        WHERE c.recipient_id = ? AND c.status = 'pending'
        ORDER BY c.created_at ASC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch pending requests: {}", e);
        ApiError::internal_server_error("Failed to fetch pending requests")
    })?;

    Ok(Json(ConnectionsResponse {
        connections,
        followers,
        following,
        pending_requests,
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/follow",
    tag = "Users",
    security(("bearerAuth" = [])),
    request_body = TargetUserRequest,
    responses(
        (status = 200, description = "Now following the user", body = AckResponse),
        (status = 400, description = "Cannot follow yourself", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn follow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let target_id = resolve_user_id(&state, &req.user_id).await?;

    if target_id == user.id {
        return Err(ApiError::bad_request("cannot follow yourself"));
    }

    sqlx::query(
        "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(user.id)
    .bind(target_id)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to follow user: {}", e);
        ApiError::internal_server_error("Failed to follow user")
    })?;

    Ok(Json(AckResponse {
        message: "Now following".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/unfollow",
    tag = "Users",
    security(("bearerAuth" = [])),
    request_body = TargetUserRequest,
    responses(
        (status = 200, description = "No longer following the user", body = AckResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn unfollow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let target_id = resolve_user_id(&state, &req.user_id).await?;

    sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followed_id = ?")
        .bind(user.id)
        .bind(target_id)
        .execute(state.db_pool())
        .await
        .map_err(|e| {
            tracing::error!("Failed to unfollow user: {}", e);
            ApiError::internal_server_error("Failed to unfollow user")
        })?;

    Ok(Json(AckResponse {
        message: "No longer following".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/connect",
    tag = "Users",
    security(("bearerAuth" = [])),
    request_body = TargetUserRequest,
    responses(
        (status = 200, description = "Connection request sent", body = AckResponse),
        (status = 400, description = "Connection already exists or is pending", body = crate::error::ErrorResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let target_id = resolve_user_id(&state, &req.user_id).await?;

    if target_id == user.id {
        return Err(ApiError::bad_request("cannot connect with yourself"));
    }

    let existing: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT 1 FROM connections
        WHERE (requester_id = ?1 AND recipient_id = ?2)
           OR (requester_id = ?2 AND recipient_id = ?1)
        "#,
    )
    .bind(user.id)
    .bind(target_id)
    .fetch_optional(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to check existing connection: {}", e);
        ApiError::internal_server_error("Failed to check existing connection")
    })?;

    if existing.is_some() {
        return Err(ApiError::bad_request(
            "connection already exists or is pending",
        ));
    }

    let now = chrono::Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO connections (requester_id, recipient_id, status, created_at, updated_at)
        VALUES (?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(user.id)
    .bind(target_id)
    .bind(&now)
    .bind(&now)
    .execute(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to create connection request: {}", e);
        ApiError::internal_server_error("Failed to create connection request")
    })?;

    Ok(Json(AckResponse {
        message: "Connection request sent".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/users/accept",
    tag = "Users",
    security(("bearerAuth" = [])),
    request_body = TargetUserRequest,
    responses(
        (status = 200, description = "Connection accepted", body = AckResponse),
        (status = 404, description = "No pending request from this user", body = crate::error::ErrorResponse)
    )
)]
pub async fn accept_connection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TargetUserRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let requester_id = resolve_user_id(&state, &req.user_id).await?;

    let result = sqlx::query(
        r#"
        UPDATE connections
        SET status = 'accepted', updated_at = ?
        WHERE requester_id = ? AND recipient_id = ? AND status = 'pending'
        "#,
    )
    .bind(chrono::Utc::now().to_rfc3339())
    .bind(requester_id)
    .bind(user.id)
    .execute(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to accept connection: {}", e);
        ApiError::internal_server_error("Failed to accept connection")
    })?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("No pending request from this user"));
    }

    Ok(Json(AckResponse {
        message: "Connection accepted".to_string(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}",
    tag = "Users",
    security(("bearerAuth" = [])),
    params(
        ("user_id" = String, Path, description = "User public identifier")
    ),
    responses(
        (status = 200, description = "User profile with posts", body = ProfileResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_user_profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (viewer, _) = state.authenticate(&token).await?;

    let profile = sqlx::query_as::<_, linkup_auth::User>(
        r#"
        SELECT id, public_id, provider_uid, email, username, full_name, bio, location, profile_picture, cover_photo
        FROM users WHERE public_id = ?
        "#,
    )
    .bind(&user_id)
    .fetch_optional(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch user profile: {}", e);
        ApiError::internal_server_error("Failed to fetch user profile")
    })?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    let posts = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.public_id AS id, p.content, p.image_urls, p.post_type, p.created_at,
               u.public_id AS author_id, u.username AS author_username,
               u.full_name AS author_full_name, u.profile_picture AS author_profile_picture,
               (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS likes_count,
               EXISTS(SELECT 1 FROM post_likes pl WHERE pl.post_id = p.id AND pl.user_id = ?) AS liked_by_me
        FROM posts p
        JOIN users u ON u.id = p.user_id
        WHERE p.user_id = ?
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(viewer.id)
    .bind(profile.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch profile posts: {}", e);
        ApiError::internal_server_error("Failed to fetch profile posts")
    })?;

    let follower_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE followed_id = ?")
            .bind(profile.id)
            .fetch_one(state.db_pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to count followers: {}", e);
                ApiError::internal_server_error("Failed to count followers")
            })?;

    let following_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM follows WHERE follower_id = ?")
            .bind(profile.id)
            .fetch_one(state.db_pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to count following: {}", e);
                ApiError::internal_server_error("Failed to count following")
            })?;

    let connection_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM connections WHERE status = 'accepted' AND (requester_id = ?1 OR recipient_id = ?1)",
    )
    .bind(profile.id)
    .fetch_one(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to count connections: {}", e);
        ApiError::internal_server_error("Failed to count connections")
    })?;

    Ok(Json(ProfileResponse {
        user: profile.into(),
        posts: posts.into_iter().map(PostResponse::from).collect(),
        follower_count,
        following_count,
        connection_count,
    }))
}

/// Resolve a public user id to its database id.
pub(crate) async fn resolve_user_id(state: &AppState, public_id: &str) -> Result<i64, ApiError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE public_id = ?")
        .bind(public_id)
        .fetch_optional(state.db_pool())
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve user: {}", e);
            ApiError::internal_server_error("Failed to resolve user")
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub(crate) async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart field: {e}")))
}

pub(crate) async fn read_bytes(
    field: axum::extract::multipart::Field<'_>,
) -> Result<bytes::Bytes, ApiError> {
    field
        .bytes()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart field: {e}")))
}

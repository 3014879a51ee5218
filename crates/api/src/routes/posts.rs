use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use crate::{
    routes::models::{LikeRequest, LikeResponse, PostCreatedResponse, PostResponse, PostRow, PostsResponse},
    routes::users::{read_bytes, read_text},
    util::require_bearer,
    ApiError, AppState,
};

const MAX_POST_IMAGES: usize = 4;

const POST_COLUMNS: &str = r#"
    p.public_id AS id, p.content, p.image_urls, p.post_type, p.created_at,
    u.public_id AS author_id, u.username AS author_username,
    u.full_name AS author_full_name, u.profile_picture AS author_profile_picture,
    (SELECT COUNT(*) FROM post_likes pl WHERE pl.post_id = p.id) AS likes_count,
    EXISTS(SELECT 1 FROM post_likes pl WHERE pl.post_id = p.id AND pl.user_id = ?1) AS liked_by_me
"#;

#[utoipa::path(
    post,
    path = "/api/posts",
    tag = "Posts",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Post created", body = PostCreatedResponse),
        (status = 400, description = "Invalid post payload", body = crate::error::ErrorResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<PostCreatedResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let mut content = String::new();
    let mut post_type: Option<String> = None;
    let mut images: Vec<(String, bytes::Bytes)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "content" => content = read_text(field).await?,
            "post_type" => post_type = Some(read_text(field).await?),
            "images" => {
                if images.len() >= MAX_POST_IMAGES {
                    return Err(ApiError::bad_request(format!(
                        "a post can include at most {MAX_POST_IMAGES} images"
                    )));
                }
                let file_name = field.file_name().unwrap_or("image").to_string();
                images.push((file_name, read_bytes(field).await?));
            }
            _ => {}
        }
    }

    if content.trim().is_empty() && images.is_empty() {
        return Err(ApiError::bad_request("post must include text or images"));
    }

    let mut image_urls = Vec::with_capacity(images.len());
    for (file_name, bytes) in &images {
        let url = state.media().upload(file_name, bytes, "posts").await?;
        image_urls.push(url);
    }

    let post_type = post_type.unwrap_or_else(|| {
        match (content.trim().is_empty(), image_urls.is_empty()) {
            (_, true) => "text".to_string(),
            (true, false) => "image".to_string(),
            (false, false) => "text_with_image".to_string(),
        }
    });

    let public_id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let image_urls_json = serde_json::to_string(&image_urls)
        .map_err(|e| ApiError::internal_server_error(format!("failed to encode image urls: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO posts (public_id, user_id, content, image_urls, post_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(user.id)
    .bind(&content)
    .bind(&image_urls_json)
    .bind(&post_type)
    .bind(&now)
    .bind(&now)
    .execute(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to create post: {}", e);
        ApiError::internal_server_error("Failed to create post")
    })?;

    let post = fetch_post(&state, user.id, &public_id).await?;
    Ok(Json(PostCreatedResponse { post }))
}

#[utoipa::path(
    get,
    path = "/api/posts/feed",
    tag = "Posts",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Feed of own, connected, and followed users' posts", body = PostsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PostsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    // Feed scope: self, followed users, and accepted connections.
    let posts = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        JOIN users u ON u.id = p.user_id
        WHERE p.user_id = ?1
           OR p.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
           OR p.user_id IN (
                SELECT CASE WHEN requester_id = ?1 THEN recipient_id ELSE requester_id END
                FROM connections
                WHERE status = 'accepted' AND (requester_id = ?1 OR recipient_id = ?1)
           )
        ORDER BY p.created_at DESC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch feed: {}", e);
        ApiError::internal_server_error("Failed to fetch feed")
    })?;

    Ok(Json(PostsResponse {
        posts: posts.into_iter().map(PostResponse::from).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/posts/like",
    tag = "Posts",
    security(("bearerAuth" = [])),
    request_body = LikeRequest,
    responses(
        (status = 200, description = "Like toggled", body = LikeResponse),
        (status = 404, description = "Post not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn like_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LikeRequest>,
) -> Result<Json<LikeResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let post_db_id: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE public_id = ?")
        .bind(&req.post_id)
        .fetch_optional(state.db_pool())
        .await
        .map_err(|e| {
            tracing::error!("Failed to resolve post: {}", e);
            ApiError::internal_server_error("Failed to resolve post")
        })?;

    let post_db_id = post_db_id.ok_or_else(|| ApiError::not_found("Post not found"))?;

    let already_liked: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_db_id)
            .bind(user.id)
            .fetch_optional(state.db_pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to check existing like: {}", e);
                ApiError::internal_server_error("Failed to check existing like")
            })?;

    let liked = if already_liked.is_some() {
        sqlx::query("DELETE FROM post_likes WHERE post_id = ? AND user_id = ?")
            .bind(post_db_id)
            .bind(user.id)
            .execute(state.db_pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to unlike post: {}", e);
                ApiError::internal_server_error("Failed to unlike post")
            })?;
        false
    } else {
        sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES (?, ?, ?)")
            .bind(post_db_id)
            .bind(user.id)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(state.db_pool())
            .await
            .map_err(|e| {
                tracing::error!("Failed to like post: {}", e);
                ApiError::internal_server_error("Failed to like post")
            })?;
        true
    };

    let likes_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = ?")
        .bind(post_db_id)
        .fetch_one(state.db_pool())
        .await
        .map_err(|e| {
            tracing::error!("Failed to count likes: {}", e);
            ApiError::internal_server_error("Failed to count likes")
        })?;

    let message = if liked { "Post liked" } else { "Post unliked" };
    Ok(Json(LikeResponse {
        liked,
        likes_count,
        message: message.to_string(),
    }))
}

async fn fetch_post(
    state: &AppState,
    viewer_id: i64,
    public_id: &str,
) -> Result<PostResponse, ApiError> {
    let row = sqlx::query_as::<_, PostRow>(&format!(
        r#"
        SELECT {POST_COLUMNS}
        FROM posts p
        JOIN users u ON u.id = p.user_id
        WHERE p.public_id = ?2
        "#
    ))
    .bind(viewer_id)
    .bind(public_id)
    .fetch_optional(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch post: {}", e);
        ApiError::internal_server_error("Failed to fetch post")
    })?
    .ok_or_else(|| ApiError::internal_server_error("Failed to fetch created post"))?;

    Ok(row.into())
}

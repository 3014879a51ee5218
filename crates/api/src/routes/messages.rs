use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use linkup_live::LiveEvent;

use crate::{
    routes::models::{ConversationsResponse, Message, MessageResponse, MessagesResponse},
    routes::users::{read_bytes, read_text, resolve_user_id},
    util::require_bearer,
    ApiError, AppState,
};

const MESSAGE_COLUMNS: &str = r#"
    m.public_id AS id, fu.public_id AS from_user_id, tu.public_id AS to_user_id,
    m.content, m.media_url, m.message_type, m.created_at
"#;

#[utoipa::path(
    post,
    path = "/api/messages/send",
    tag = "Messages",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Message created and pushed to the recipient's live stream", body = MessageResponse),
        (status = 400, description = "Invalid message payload", body = crate::error::ErrorResponse),
        (status = 404, description = "Recipient not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let mut to_user_id = String::new();
    let mut content = String::new();
    let mut image: Option<(String, bytes::Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart payload: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "to_user_id" => to_user_id = read_text(field).await?,
            "content" => content = read_text(field).await?,
            "image" => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                image = Some((file_name, read_bytes(field).await?));
            }
            _ => {}
        }
    }

    if to_user_id.is_empty() {
        return Err(ApiError::bad_request("to_user_id is required"));
    }
    if content.trim().is_empty() && image.is_none() {
        return Err(ApiError::bad_request("message must include text or an image"));
    }

    let recipient_db_id = resolve_user_id(&state, &to_user_id).await?;

    let media_url = match &image {
        Some((file_name, bytes)) => {
            Some(state.media().upload(file_name, bytes, "messages").await?)
        }
        None => None,
    };

    let message_type = if media_url.is_some() { "image" } else { "text" };
    let public_id = cuid2::create_id();
    let now = chrono::Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO messages (public_id, from_user_id, to_user_id, content, media_url, message_type, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&public_id)
    .bind(user.id)
    .bind(recipient_db_id)
    .bind(&content)
    .bind(&media_url)
    .bind(message_type)
    .bind(&now)
    .execute(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to create message: {}", e);
        ApiError::internal_server_error("Failed to create message")
    })?;

    let message = Message {
        id: public_id,
        from_user_id: user.public_id.clone(),
        to_user_id: to_user_id.clone(),
        content,
        media_url,
        message_type: message_type.to_string(),
        created_at: now,
    };

    // Push to any live stream the recipient has open; delivery is best
    // effort and nothing is queued for offline recipients.
    let reached = state
        .hub()
        .publish(
            &to_user_id,
            LiveEvent::Message {
                message: message.clone().into(),
            },
        )
        .await;
    tracing::debug!(recipient = %to_user_id, reached, "published message to live channel");

    Ok(Json(MessageResponse { message }))
}

#[utoipa::path(
    get,
    path = "/api/messages/{user_id}",
    tag = "Messages",
    security(("bearerAuth" = [])),
    params(
        ("user_id" = String, Path, description = "Peer user public identifier")
    ),
    responses(
        (status = 200, description = "Conversation history, oldest first", body = MessagesResponse),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessagesResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;
    let peer_db_id = resolve_user_id(&state, &user_id).await?;

    let messages = sqlx::query_as::<_, Message>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages m
        JOIN users fu ON fu.id = m.from_user_id
        JOIN users tu ON tu.id = m.to_user_id
        WHERE (m.from_user_id = ?1 AND m.to_user_id = ?2)
           OR (m.from_user_id = ?2 AND m.to_user_id = ?1)
        ORDER BY m.created_at ASC
        "#
    ))
    .bind(user.id)
    .bind(peer_db_id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch conversation: {}", e);
        ApiError::internal_server_error("Failed to fetch conversation")
    })?;

    Ok(Json(MessagesResponse { messages }))
}

#[utoipa::path(
    get,
    path = "/api/messages/recent",
    tag = "Messages",
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "Most recent message per conversation, newest first", body = ConversationsResponse),
        (status = 401, description = "Authentication required", body = crate::error::ErrorResponse)
    )
)]
pub async fn recent_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let token = require_bearer(&headers)?;
    let (user, _) = state.authenticate(&token).await?;

    let messages = sqlx::query_as::<_, Message>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages m
        JOIN users fu ON fu.id = m.from_user_id
        JOIN users tu ON tu.id = m.to_user_id
        WHERE m.from_user_id = ?1 OR m.to_user_id = ?1
        ORDER BY m.created_at DESC, m.id DESC
        "#
    ))
    .bind(user.id)
    .fetch_all(state.db_pool())
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch recent messages: {}", e);
        ApiError::internal_server_error("Failed to fetch recent messages")
    })?;

    // Keep the newest message per peer, preserving recency order.
    let mut seen = std::collections::HashSet::new();
    let conversations = messages
        .into_iter()
        .filter(|message| {
            let peer = if message.from_user_id == user.public_id {
                message.to_user_id.clone()
            } else {
                message.from_user_id.clone()
            };
            seen.insert(peer)
        })
        .collect();

    Ok(Json(ConversationsResponse { conversations }))
}

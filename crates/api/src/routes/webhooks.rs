//! Inbound identity-provider webhooks, relayed to the workflow engine.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{info, warn};

use crate::{routes::models::WebhookAck, ApiError, AppState};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[utoipa::path(
    post,
    path = "/api/webhooks/identity",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Event acknowledged", body = WebhookAck),
        (status = 400, description = "Signature verification failed or payload malformed", body = crate::error::ErrorResponse),
        (status = 502, description = "Workflow engine rejected the event", body = crate::error::ErrorResponse)
    )
)]
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    if let Some(secret) = state.webhook_secret() {
        verify_signature(secret, &headers, &body)?;
    } else {
        warn!("webhook signature verification skipped: no signing secret configured");
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid webhook payload: {e}")))?;

    // User lifecycle events go to the workflow engine, which owns the
    // create/update/delete work; this handler only relays.
    let relayed_name = match event.kind.as_str() {
        "user.created" => "identity/user.created",
        "user.updated" => "identity/user.updated",
        "user.deleted" => "identity/user.deleted",
        other => {
            info!(event = other, "ignoring unhandled webhook event type");
            return Ok(Json(WebhookAck {
                success: true,
                message: "event received but not handled".to_string(),
            }));
        }
    };

    state
        .relay()
        .send(relayed_name, &event.data)
        .await
        .map_err(|e| {
            tracing::error!("Failed to relay webhook event: {}", e);
            ApiError::new(
                axum::http::StatusCode::BAD_GATEWAY,
                "failed to relay event to workflow engine",
            )
        })?;

    Ok(Json(WebhookAck {
        success: true,
        message: "event relayed to workflow engine".to_string(),
    }))
}

/// Verify an HMAC-signed webhook: signature over `{id}.{timestamp}.{body}`
/// with the base64 portion of the signing secret, matched against any of
/// the space-separated `v1,<sig>` entries in the signature header.
fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), ApiError> {
    let id = header_str(headers, "svix-id")?;
    let timestamp = header_str(headers, "svix-timestamp")?;
    let signatures = header_str(headers, "svix-signature")?;

    let key_material = secret.strip_prefix("whsec_").unwrap_or(secret);
    let key = BASE64
        .decode(key_material)
        .map_err(|_| ApiError::bad_request("invalid webhook signing secret"))?;

    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|_| ApiError::bad_request("invalid webhook signing secret"))?;
    mac.update(id.as_bytes());
    mac.update(b".");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    let expected = BASE64.encode(mac.finalize().into_bytes());

    let matched = signatures
        .split_whitespace()
        .map(|candidate| candidate.strip_prefix("v1,").unwrap_or(candidate))
        .any(|candidate| candidate == expected);

    if matched {
        Ok(())
    } else {
        warn!("webhook signature verification failed");
        Err(ApiError::bad_request("webhook signature verification failed"))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ApiError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::bad_request("missing webhook signature headers"))
}

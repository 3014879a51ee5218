//! Server-sent-events endpoint backing the live update channel.

use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::{util::require_bearer, ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Browser `EventSource` cannot set headers, so the token may also
    /// arrive as a query parameter.
    token: Option<String>,
}

/// Open the per-user live message stream.
///
/// Emits one `message` event per direct message created for the
/// authenticated user after the stream opened; earlier messages come from
/// the ordinary history fetch. Subscribers that fall behind have events
/// dropped, not replayed.
pub async fn message_stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let token = match require_bearer(&headers) {
        Ok(token) => token,
        Err(_) => query
            .token
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?,
    };
    let (user, _) = state.authenticate(&token).await?;

    let receiver = state.hub().subscribe(&user.public_id).await;
    info!(user = %user.public_id, "live message stream opened");

    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(event) => match Event::default().event("message").json_data(&event) {
                Ok(sse_event) => Some(Ok(sse_event)),
                Err(error) => {
                    warn!(%error, "failed to encode live event");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(skipped, "live stream lagged, dropping events");
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keepalive())
            .text("keep-alive"),
    ))
}

use std::time::Duration;

use linkup_auth::{AuthSession, Authenticator, User};
use linkup_config::AppConfig;
use linkup_live::LiveHub;
use sqlx::SqlitePool;

use crate::{media::MediaClient, relay::EngineRelay, ApiError};

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    authenticator: Authenticator,
    hub: LiveHub,
    media: MediaClient,
    relay: EngineRelay,
    webhook_secret: Option<String>,
    keepalive: Duration,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        hub: LiveHub,
        config: &AppConfig,
    ) -> Self {
        Self {
            db_pool,
            authenticator,
            hub,
            media: MediaClient::new(config.media.clone()),
            relay: EngineRelay::new(&config.webhook),
            webhook_secret: config.webhook.signing_secret.clone(),
            keepalive: Duration::from_secs(config.live.keepalive_seconds),
        }
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn hub(&self) -> &LiveHub {
        &self.hub
    }

    pub fn media(&self) -> &MediaClient {
        &self.media
    }

    pub fn relay(&self) -> &EngineRelay {
        &self.relay
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }
}

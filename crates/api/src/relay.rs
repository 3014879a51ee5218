use anyhow::Context;
use linkup_config::WebhookConfig;
use serde_json::json;
use tracing::{debug, info};

/// Client for the external workflow engine that owns background user-sync
/// work.
///
/// The relay is fire-and-forget: one POST per event, no retries and no
/// ordering guarantees. The engine deduplicates and sequences on its side.
#[derive(Clone)]
pub struct EngineRelay {
    http: reqwest::Client,
    endpoint: Option<String>,
}

impl EngineRelay {
    pub fn new(config: &WebhookConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("linkup-backend")
            .build()
            .expect("failed to build workflow engine http client");

        let endpoint = config.engine_url.as_deref().map(|url| {
            format!(
                "{}/e/{}",
                url.trim_end_matches('/'),
                config.engine_event_key.as_deref().unwrap_or("local")
            )
        });

        Self { http, endpoint }
    }

    pub fn enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Forward a named event to the workflow engine.
    pub async fn send(&self, name: &str, data: &serde_json::Value) -> anyhow::Result<()> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            debug!(event = name, "workflow engine not configured, dropping event");
            return Ok(());
        };

        self.http
            .post(endpoint)
            .json(&json!({ "name": name, "data": data }))
            .send()
            .await
            .context("failed to reach workflow engine")?
            .error_for_status()
            .context("workflow engine rejected event")?;

        info!(event = name, "relayed event to workflow engine");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_includes_event_key() {
        let relay = EngineRelay::new(&WebhookConfig {
            signing_secret: None,
            engine_url: Some("https://engine.example.com/".to_string()),
            engine_event_key: Some("key123".to_string()),
        });

        assert!(relay.enabled());
        assert_eq!(
            relay.endpoint.as_deref(),
            Some("https://engine.example.com/e/key123")
        );
    }

    #[tokio::test]
    async fn send_without_engine_is_a_noop() {
        let relay = EngineRelay::new(&WebhookConfig::default());
        assert!(!relay.enabled());
        relay
            .send("identity/user.created", &json!({ "id": "u1" }))
            .await
            .expect("unconfigured relay should drop events");
    }
}

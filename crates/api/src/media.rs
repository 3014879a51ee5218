use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use linkup_config::MediaConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ApiError;

/// Client for the image CDN that stores post and profile images.
///
/// Files are uploaded as base64 payloads; the CDN answers with a file path
/// that is served back through the delivery host with a fixed
/// resize-and-recompress transformation, so original uploads never reach
/// clients directly.
#[derive(Clone)]
pub struct MediaClient {
    http: reqwest::Client,
    config: MediaConfig,
}

impl MediaClient {
    pub fn new(config: MediaConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("linkup-backend")
            .build()
            .expect("failed to build media http client");

        Self { http, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.private_key.is_some()
    }

    /// Upload `bytes` and return the transformed delivery URL.
    pub async fn upload(
        &self,
        file_name: &str,
        bytes: &[u8],
        folder: &str,
    ) -> Result<String, ApiError> {
        let Some(private_key) = self.config.private_key.as_deref() else {
            return Err(ApiError::new(
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "media uploads are not configured",
            ));
        };

        let request = UploadRequest {
            file: BASE64.encode(bytes),
            file_name,
            folder,
        };

        let response: UploadResponse = self
            .http
            .post(&self.config.upload_url)
            .basic_auth(private_key, Some(""))
            .json(&request)
            .send()
            .await
            .context("failed to call media upload api")
            .map_err(bad_gateway)?
            .error_for_status()
            .context("media upload api returned error")
            .map_err(bad_gateway)?
            .json()
            .await
            .context("failed to decode media upload response")
            .map_err(bad_gateway)?;

        debug!(file_path = %response.file_path, "uploaded media file");
        Ok(self.delivery_url(&response.file_path))
    }

    fn delivery_url(&self, file_path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.delivery_url.trim_end_matches('/'),
            self.config.transformation,
            file_path.trim_start_matches('/')
        )
    }
}

fn bad_gateway(error: anyhow::Error) -> ApiError {
    tracing::error!(error = ?error, "media upload failed");
    ApiError::new(axum::http::StatusCode::BAD_GATEWAY, error.to_string())
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    file: String,
    #[serde(rename = "fileName")]
    file_name: &'a str,
    folder: &'a str,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(rename = "filePath")]
    file_path: String,
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "linkup.toml",
    "config/linkup.toml",
    "crates/config/linkup.toml",
    "../linkup.toml",
    "../config/linkup.toml",
    "../crates/config/linkup.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub media: MediaConfig,
    // No builder defaults exist for this section; tolerate its absence.
    #[serde(default)]
    pub webhook: WebhookConfig,
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://linkup.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
    #[serde(default)]
    pub identity: IdentityProviderConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 3_600,
            identity: IdentityProviderConfig::default(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        3_600
    }
}

/// Settings for the third-party identity provider that owns sign-in.
///
/// Verification is disabled until a `secret_key` is configured, at which
/// point bearer tokens are introspected against `base_url`.
///
/// ```
/// use linkup_config::IdentityProviderConfig;
///
/// let identity = IdentityProviderConfig::default();
/// assert_eq!(identity.base_url, "https://api.identity.example.com");
/// assert!(identity.secret_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    #[serde(default = "IdentityProviderConfig::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "IdentityProviderConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl IdentityProviderConfig {
    fn default_base_url() -> String {
        "https://api.identity.example.com".to_string()
    }

    const fn default_request_timeout() -> u64 {
        10
    }
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            secret_key: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

/// Settings for the image CDN that stores post and profile images.
///
/// Uploaded files are served through `delivery_url` with `transformation`
/// applied, so clients always receive resized webp variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default = "MediaConfig::default_upload_url")]
    pub upload_url: String,
    #[serde(default = "MediaConfig::default_delivery_url")]
    pub delivery_url: String,
    #[serde(default = "MediaConfig::default_transformation")]
    pub transformation: String,
}

impl MediaConfig {
    fn default_upload_url() -> String {
        "https://upload.mediakit.example.com/api/v1/files/upload".to_string()
    }

    fn default_delivery_url() -> String {
        "https://cdn.mediakit.example.com/linkup".to_string()
    }

    fn default_transformation() -> String {
        "tr:q-auto,f-webp,w-1280".to_string()
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            upload_url: Self::default_upload_url(),
            delivery_url: Self::default_delivery_url(),
            transformation: Self::default_transformation(),
        }
    }
}

/// Settings for inbound identity webhooks and the workflow engine they are
/// relayed to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    #[serde(default)]
    pub signing_secret: Option<String>,
    #[serde(default)]
    pub engine_url: Option<String>,
    #[serde(default)]
    pub engine_event_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "LiveConfig::default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "LiveConfig::default_keepalive_seconds")]
    pub keepalive_seconds: u64,
}

impl LiveConfig {
    const fn default_channel_capacity() -> usize {
        100
    }

    const fn default_keepalive_seconds() -> u64 {
        15
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_channel_capacity(),
            keepalive_seconds: Self::default_keepalive_seconds(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use linkup_config::load;
///
/// std::env::remove_var("LINKUP_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl = defaults.auth.session_ttl_seconds;
    let session_ttl_i64 = if session_ttl > i64::MAX as u64 {
        i64::MAX
    } else {
        session_ttl as i64
    };

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default("database.url", defaults.database.url.clone())
        .unwrap()
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )
        .unwrap()
        .set_default("auth.session_ttl_seconds", session_ttl_i64)
        .unwrap()
        .set_default(
            "auth.identity.base_url",
            defaults.auth.identity.base_url.clone(),
        )
        .unwrap()
        .set_default(
            "auth.identity.request_timeout_seconds",
            i64::try_from(defaults.auth.identity.request_timeout_seconds).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default("media.upload_url", defaults.media.upload_url.clone())
        .unwrap()
        .set_default("media.delivery_url", defaults.media.delivery_url.clone())
        .unwrap()
        .set_default(
            "media.transformation",
            defaults.media.transformation.clone(),
        )
        .unwrap()
        .set_default(
            "live.channel_capacity",
            i64::try_from(defaults.live.channel_capacity).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default(
            "live.keepalive_seconds",
            i64::try_from(defaults.live.keepalive_seconds).unwrap_or(i64::MAX),
        )
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("LINKUP").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("LINKUP_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via LINKUP_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use cuid2::CuidConstructor;
use linkup_config::{AuthConfig, IdentityProviderConfig};
use once_cell::sync::Lazy;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool, Transaction};
use thiserror::Error;
use tracing::{debug, info};

static CUID: Lazy<CuidConstructor> = Lazy::new(CuidConstructor::new);

/// Verifies provider-issued bearer tokens and keeps the local `users` table
/// in sync with the identity provider.
///
/// Verified tokens are cached in the `sessions` table so that only the
/// first request of a session pays for a round-trip to the provider.
#[derive(Clone)]
pub struct Authenticator {
    pool: SqlitePool,
    session_ttl: Duration,
    identity: Option<IdentityProvider>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider is not configured")]
    ProviderDisabled,
    #[error("identity provider error: {0}")]
    Provider(#[from] anyhow::Error),
    #[error("invalid bearer token")]
    InvalidToken,
    #[error("user not found")]
    UserNotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub public_id: String,
    #[serde(skip_serializing)]
    pub provider_uid: String,
    pub email: Option<String>,
    pub username: String,
    pub full_name: String,
    pub bio: String,
    pub location: String,
    pub profile_picture: String,
    pub cover_photo: String,
}

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
}

/// Subject profile returned by the identity provider for a verified token.
#[derive(Debug, Clone)]
pub struct IdentityProfile {
    pub id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub image_url: Option<String>,
}

/// Profile fields a user may change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserProfile {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub profile_picture: Option<String>,
    pub cover_photo: Option<String>,
}

impl Authenticator {
    pub fn new(pool: SqlitePool, config: AuthConfig) -> Self {
        let session_ttl = Duration::seconds(config.session_ttl_seconds as i64);
        let identity = IdentityProvider::from_config(&config.identity);

        Self {
            pool,
            session_ttl,
            identity,
        }
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub fn identity_enabled(&self) -> bool {
        self.identity.is_some()
    }

    /// Resolve a provider-issued bearer token to a local user.
    ///
    /// Checks the session cache first; on a miss the token is introspected
    /// against the identity provider and the subject is synced into the
    /// local `users` table before the token is cached.
    pub async fn authenticate_token(&self, token: &str) -> Result<(User, AuthSession), AuthError> {
        if let Some(session) = self.cached_session(token).await? {
            let user = self.fetch_user(session.user_id).await?;
            return Ok((user, session));
        }

        let identity = self.identity.as_ref().ok_or(AuthError::ProviderDisabled)?;
        let profile = identity
            .verify_token(token)
            .await
            .map_err(AuthError::Provider)?
            .ok_or(AuthError::InvalidToken)?;

        self.authenticate_with_profile(token, profile).await
    }

    /// Record a verified token for the given subject profile.
    ///
    /// Split out of [`authenticate_token`] so the sync-and-cache path can be
    /// exercised without a live provider.
    pub async fn authenticate_with_profile(
        &self,
        token: &str,
        profile: IdentityProfile,
    ) -> Result<(User, AuthSession), AuthError> {
        let user = self.sync_user(&profile).await?;
        let session = self.cache_session(user.id, token).await?;
        Ok((user, session))
    }

    /// Find the local user for a provider subject, creating one on first
    /// sight.
    pub async fn sync_user(&self, profile: &IdentityProfile) -> Result<User, AuthError> {
        if let Some(user) = sqlx::query_as::<_, User>(
            "SELECT id, public_id, provider_uid, email, username, full_name, bio, location, profile_picture, cover_photo FROM users WHERE provider_uid = ?",
        )
        .bind(&profile.id)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok(user);
        }

        let mut tx = self.pool.begin().await?;
        let user = self.insert_user(&mut tx, profile).await?;
        tx.commit().await?;

        info!(user = %user.public_id, provider_uid = %profile.id, "synced new user from identity provider");
        Ok(user)
    }

    pub async fn user_profile(&self, user_id: i64) -> Result<User, AuthError> {
        self.fetch_user(user_id).await
    }

    pub async fn update_user_profile(
        &self,
        user_id: i64,
        update: UpdateUserProfile,
    ) -> Result<User, AuthError> {
        let current = self.fetch_user(user_id).await?;

        let username = update.username.unwrap_or(current.username);
        let full_name = update.full_name.unwrap_or(current.full_name);
        let bio = update.bio.unwrap_or(current.bio);
        let location = update.location.unwrap_or(current.location);
        let profile_picture = update.profile_picture.unwrap_or(current.profile_picture);
        let cover_photo = update.cover_photo.unwrap_or(current.cover_photo);

        sqlx::query(
            r#"
            UPDATE users
            SET username = ?, full_name = ?, bio = ?, location = ?, profile_picture = ?, cover_photo = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&username)
        .bind(&full_name)
        .bind(&bio)
        .bind(&location)
        .bind(&profile_picture)
        .bind(&cover_photo)
        .bind(Utc::now().to_rfc3339())
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        self.fetch_user(user_id).await
    }

    async fn cached_session(&self, token: &str) -> Result<Option<AuthSession>, AuthError> {
        let row = sqlx::query("SELECT user_id, expires_at FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user_id: i64 = row.try_get("user_id")?;
        let expires_at: String = row.try_get("expires_at")?;

        let Ok(expires_at) = DateTime::parse_from_rfc3339(&expires_at) else {
            return Ok(None);
        };
        let expires_at = expires_at.with_timezone(&Utc);

        if expires_at <= Utc::now() {
            sqlx::query("DELETE FROM sessions WHERE token = ?")
                .bind(token)
                .execute(&self.pool)
                .await?;
            return Ok(None);
        }

        Ok(Some(AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        }))
    }

    async fn cache_session(&self, user_id: i64, token: &str) -> Result<AuthSession, AuthError> {
        let now = Utc::now();
        let expires_at = now + self.session_ttl;

        sqlx::query(
            "INSERT OR REPLACE INTO sessions (user_id, token, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(token)
        .bind(now.to_rfc3339())
        .bind(expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(AuthSession {
            token: token.to_owned(),
            user_id,
            expires_at,
        })
    }

    async fn insert_user(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        profile: &IdentityProfile,
    ) -> Result<User, AuthError> {
        let now = Utc::now().to_rfc3339();
        let public_id = new_public_id();
        let username = self.available_username(tx, profile).await?;
        let full_name = profile.full_name.clone().unwrap_or_default();
        let profile_picture = profile.image_url.clone().unwrap_or_default();

        sqlx::query(
            r#"
            INSERT INTO users (public_id, provider_uid, email, username, full_name, profile_picture, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&public_id)
        .bind(&profile.id)
        .bind(profile.email.as_deref())
        .bind(&username)
        .bind(&full_name)
        .bind(&profile_picture)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM users WHERE public_id = ?")
            .bind(&public_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(User {
            id,
            public_id,
            provider_uid: profile.id.clone(),
            email: profile.email.clone(),
            username,
            full_name,
            bio: String::new(),
            location: String::new(),
            profile_picture,
            cover_photo: String::new(),
        })
    }

    /// Derive a unique username from the profile, suffixing on collision.
    async fn available_username(
        &self,
        tx: &mut Transaction<'_, sqlx::Sqlite>,
        profile: &IdentityProfile,
    ) -> Result<String, AuthError> {
        let base = profile
            .username
            .clone()
            .or_else(|| {
                profile
                    .email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .map(|local| local.to_string())
            })
            .filter(|candidate| !candidate.is_empty())
            .unwrap_or_else(|| format!("user_{}", new_public_id()));

        let taken: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE username = ?")
            .bind(&base)
            .fetch_optional(&mut **tx)
            .await?;

        if taken.is_none() {
            return Ok(base);
        }

        Ok(format!("{base}_{}", new_public_id()))
    }

    async fn fetch_user(&self, id: i64) -> Result<User, AuthError> {
        sqlx::query_as::<_, User>(
            "SELECT id, public_id, provider_uid, email, username, full_name, bio, location, profile_picture, cover_photo FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)
    }
}

fn new_public_id() -> String {
    CUID.create_id()
}

#[derive(Clone)]
struct IdentityProvider {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl IdentityProvider {
    fn from_config(config: &IdentityProviderConfig) -> Option<Self> {
        let secret_key = config.secret_key.clone()?;

        let http = reqwest::Client::builder()
            .user_agent("linkup-backend")
            .timeout(std::time::Duration::from_secs(
                config.request_timeout_seconds,
            ))
            .build()
            .expect("failed to build identity provider http client");

        Some(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Introspect a bearer token. `Ok(None)` means the provider rejected it.
    async fn verify_token(&self, token: &str) -> anyhow::Result<Option<IdentityProfile>> {
        let url = format!("{}/v1/tokens/verify", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header(ACCEPT, "application/json")
            .json(&VerifyTokenRequest { token })
            .send()
            .await
            .context("failed to call identity provider")?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::NOT_FOUND
        {
            return Ok(None);
        }

        let subject: VerifyTokenResponse = response
            .error_for_status()
            .context("identity provider returned error")?
            .json()
            .await
            .context("failed to decode identity provider response")?;

        debug!(subject = %subject.user_id, "verified token with identity provider");

        let full_name = match (&subject.first_name, &subject.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.clone()),
            (None, Some(last)) => Some(last.clone()),
            (None, None) => None,
        };

        Ok(Some(IdentityProfile {
            id: subject.user_id,
            email: subject.email,
            username: subject.username,
            full_name,
            image_url: subject.image_url,
        }))
    }
}

#[derive(Serialize)]
struct VerifyTokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyTokenResponse {
    user_id: String,
    email: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

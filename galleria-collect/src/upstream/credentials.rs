//! Upstream API credential management
//!
//! The credential set is a process-wide singleton. Callers never touch raw
//! token fields; they ask for `get_valid_token()` and the store refreshes
//! lazily behind a mutex, so concurrent workers either wait for an in-flight
//! refresh or reuse the token it produced. Refreshed tokens are written back
//! to the settings table so a restart resumes with the newest pair.

use super::types::TokenResponse;
use super::UpstreamError;
use chrono::{DateTime, Duration, Utc};
use galleria_common::config::TomlConfig;
use galleria_common::db::{get_setting, set_setting};
use sqlx::SqlitePool;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh this long before the recorded expiry to absorb clock skew
const EXPIRY_MARGIN_SECS: i64 = 60;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Upstream API credential set
#[derive(Debug, Clone)]
pub struct ApiCredential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiCredential {
    /// Token is present and not within the expiry margin
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expires_at {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => false,
        }
    }
}

/// Mutex-guarded credential store with lazy refresh
pub struct CredentialStore {
    db: SqlitePool,
    http: reqwest::Client,
    auth_url: String,
    inner: Mutex<ApiCredential>,
}

impl CredentialStore {
    pub fn new(db: SqlitePool, auth_url: String, credential: ApiCredential) -> Self {
        Self {
            db,
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            auth_url,
            inner: Mutex::new(credential),
        }
    }

    /// Resolve the initial credential set: settings table first, then
    /// environment, then TOML (for the refresh token only).
    pub async fn load(
        db: SqlitePool,
        auth_url: String,
        toml_config: &TomlConfig,
    ) -> galleria_common::Result<Self> {
        let access_token: String = get_setting(&db, "access_token").await?.unwrap_or_default();

        let refresh_token = match get_setting::<String>(&db, "refresh_token").await? {
            Some(token) if !token.trim().is_empty() => token,
            _ => match std::env::var("GALLERIA_REFRESH_TOKEN") {
                Ok(token) if !token.trim().is_empty() => token,
                _ => toml_config.refresh_token.clone().unwrap_or_default(),
            },
        };

        if refresh_token.trim().is_empty() {
            return Err(galleria_common::Error::Config(
                "Upstream refresh token not configured. Provide one via:\n\
                 1. settings table key 'refresh_token'\n\
                 2. Environment: GALLERIA_REFRESH_TOKEN=...\n\
                 3. TOML config: refresh_token = \"...\""
                    .to_string(),
            ));
        }

        let expires_at = get_setting::<String>(&db, "token_expires_at")
            .await?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self::new(
            db,
            auth_url,
            ApiCredential {
                access_token,
                refresh_token,
                expires_at,
            },
        ))
    }

    /// Return a valid access token, refreshing first when expired.
    ///
    /// The mutex is held across the refresh so only one caller refreshes;
    /// the others block briefly and reuse the fresh token.
    pub async fn get_valid_token(&self) -> Result<String, UpstreamError> {
        let mut credential = self.inner.lock().await;
        let now = Utc::now();

        if credential.is_valid(now) {
            return Ok(credential.access_token.clone());
        }

        debug!(
            expires_at = ?credential.expires_at,
            "Access token missing or expired, refreshing"
        );
        self.refresh_locked(&mut credential).await?;
        Ok(credential.access_token.clone())
    }

    /// Discard the current access token and refresh unconditionally.
    ///
    /// Used after the upstream rejects a token the store still believed
    /// valid (401 mid-flight).
    pub async fn force_refresh(&self) -> Result<String, UpstreamError> {
        let mut credential = self.inner.lock().await;
        self.refresh_locked(&mut credential).await?;
        Ok(credential.access_token.clone())
    }

    async fn refresh_locked(&self, credential: &mut ApiCredential) -> Result<(), UpstreamError> {
        let response = self
            .http
            .post(&self.auth_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", credential.refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::Credential(format!("Token refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Credential(format!(
                "Token refresh rejected with {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Credential(format!("Token refresh parse failed: {}", e)))?;

        let expires_at = Utc::now() + Duration::seconds(token.expires_in);
        credential.access_token = token.access_token;
        credential.refresh_token = token.refresh_token;
        credential.expires_at = Some(expires_at);

        // Best-effort persistence; a failed write only costs a re-refresh
        // after restart.
        if let Err(e) = self.persist(credential).await {
            warn!(error = %e, "Failed to persist refreshed credentials");
        }

        info!(expires_at = %expires_at, "Upstream access token refreshed");
        Ok(())
    }

    async fn persist(&self, credential: &ApiCredential) -> galleria_common::Result<()> {
        set_setting(&self.db, "access_token", &credential.access_token).await?;
        set_setting(&self.db, "refresh_token", &credential.refresh_token).await?;
        if let Some(expiry) = credential.expires_at {
            set_setting(&self.db, "token_expires_at", expiry.to_rfc3339()).await?;
        }
        Ok(())
    }
}

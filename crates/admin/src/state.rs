//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;

use crate::config::AdminConfig;
use crate::services::{
    AuthService, EmailService, OAuthClient, QueryCache, UploadError, UploadSigner,
};

/// Errors building [`AppState`].
#[derive(Debug, Error)]
pub enum StateError {
    #[error("SMTP setup failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("storage setup failed: {0}")]
    Storage(#[from] UploadError),
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    email: EmailService,
    cache: QueryCache,
    oauth: OAuthClient,
    uploads: Option<UploadSigner>,
}

impl AppState {
    /// Build the state and its service clients from configuration.
    ///
    /// # Errors
    ///
    /// Returns `StateError` if the SMTP relay or storage endpoint is invalid.
    pub fn new(config: AdminConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = EmailService::new(config.email.as_ref())?;
        let uploads = config
            .storage
            .as_ref()
            .map(UploadSigner::new)
            .transpose()?;
        if uploads.is_none() {
            tracing::warn!("Object storage not configured; image uploads are disabled");
        }
        let cache = QueryCache::new(config.cache_ttl);
        let oauth = OAuthClient::new(&config);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                email,
                cache,
                oauth,
                uploads,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.inner.cache
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthClient {
        &self.inner.oauth
    }

    /// Upload signer, `None` when storage is not configured.
    #[must_use]
    pub fn uploads(&self) -> Option<&UploadSigner> {
        self.inner.uploads.as_ref()
    }

    /// Auth service bound to this state's pool and mailer.
    #[must_use]
    pub fn auth(&self) -> AuthService<'_> {
        AuthService::new(
            &self.inner.pool,
            &self.inner.email,
            &self.inner.config.base_url,
        )
    }
}

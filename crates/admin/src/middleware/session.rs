//! Session middleware configuration for admin.
//!
//! Sets up `PostgreSQL`-backed sessions in `rx.session`. The cookie is signed
//! with a key derived from `SESSION_SECRET` and uses `SameSite=Lax` so the
//! OAuth provider redirect back to `/auth/oauth/{provider}/callback` still
//! carries it.

use secrecy::ExposeSecret;
use sha2::{Digest, Sha512};
use sqlx::PgPool;
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::AdminConfig;

/// Session cookie name for admin.
pub const SESSION_COOKIE_NAME: &str = "rx_admin_session";

/// Session expiry time in seconds (24 hours of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// # Panics
///
/// Panics if the schema name or table name is invalid (should never happen
/// with hardcoded "rx" and "session" values).
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &AdminConfig,
) -> SessionManagerLayer<PostgresStore, tower_sessions::service::SignedCookie> {
    // The table is created by migration; the store never creates it.
    let store = PostgresStore::new(pool.clone())
        .with_schema_name("rx")
        .expect("valid schema name")
        .with_table_name("session")
        .expect("valid table name");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(signing_key(config))
}

/// Derive the 64-byte cookie signing key from `SESSION_SECRET`.
fn signing_key(config: &AdminConfig) -> Key {
    let digest = Sha512::digest(config.session_secret.expose_secret().as_bytes());
    Key::from(digest.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    #[test]
    fn test_signing_key_is_stable_per_secret() {
        let config = test_config();
        assert_eq!(
            signing_key(&config).master(),
            signing_key(&config).master()
        );

        let mut other = test_config();
        other.session_secret =
            secrecy::SecretString::from("a-completely-different-secret-value-123");
        assert_ne!(signing_key(&config).master(), signing_key(&other).master());
    }
}

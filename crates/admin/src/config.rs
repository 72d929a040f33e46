//! Back-office configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `APP_BASE_URL` - Public URL of the back-office (used in emails and OAuth redirects)
//! - `SESSION_SECRET` - Session cookie signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `APP_HOST` - Bind address (default: 127.0.0.1)
//! - `APP_PORT` - Listen port (default: 3000)
//! - `CACHE_TTL_SECONDS` - Query cache time-to-live (default: 300)
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (SMTP - all or none)
//! - `SMTP_HOST`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//! - `SMTP_PORT` - SMTP port (default: 587)
//!
//! Without SMTP the email service logs links and codes instead of sending them.
//!
//! ## Optional (object storage - all or none)
//! - `STORAGE_ENDPOINT` - S3-compatible endpoint, e.g. `https://s3.us-east-1.amazonaws.com`
//! - `STORAGE_REGION`, `STORAGE_BUCKET`
//! - `STORAGE_ACCESS_KEY_ID`, `STORAGE_SECRET_ACCESS_KEY`
//! - `STORAGE_PUBLIC_URL` - Base URL objects are served from (default: `{endpoint}/{bucket}`)
//!
//! ## Optional (OAuth providers - id and secret together)
//! - `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET`
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text (local development).
    #[default]
    Text,
    /// One JSON object per event (production log shipping).
    Json,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Back-office application configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without a trailing slash
    pub base_url: String,
    /// Session cookie signing secret
    pub session_secret: SecretString,
    /// SMTP configuration (optional - emails are logged when absent)
    pub email: Option<EmailConfig>,
    /// Object storage for product images (optional - uploads disabled when absent)
    pub storage: Option<StorageConfig>,
    /// GitHub OAuth application (optional)
    pub github: Option<OAuthProviderConfig>,
    /// Google OAuth application (optional)
    pub google: Option<OAuthProviderConfig>,
    /// Time-to-live for cached query results
    pub cache_ttl: Duration,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// S3-compatible object storage configuration.
#[derive(Clone)]
pub struct StorageConfig {
    /// Endpoint URL (scheme and host, no bucket)
    pub endpoint: String,
    /// Signing region
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: SecretString,
    /// Base URL uploaded objects are publicly served from
    pub public_url: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// OAuth application credentials for one identity provider.
#[derive(Clone)]
pub struct OAuthProviderConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
}

impl std::fmt::Debug for OAuthProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl AdminConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let host = get_env_or_default("APP_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("APP_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("APP_PORT".to_string(), e.to_string()))?;
        let base_url = normalize_base_url(&get_required_env("APP_BASE_URL")?)?;
        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        let email = EmailConfig::from_env()?;
        let storage = StorageConfig::from_env()?;
        let github = OAuthProviderConfig::from_parts(
            "GITHUB",
            get_optional_env("GITHUB_CLIENT_ID"),
            get_optional_env("GITHUB_CLIENT_SECRET"),
        )?;
        let google = OAuthProviderConfig::from_parts(
            "GOOGLE",
            get_optional_env("GOOGLE_CLIENT_ID"),
            get_optional_env("GOOGLE_CLIENT_SECRET"),
        )?;

        let cache_ttl = get_optional_env("CACHE_TTL_SECONDS")
            .map(|s| {
                s.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("CACHE_TTL_SECONDS".to_string(), e.to_string())
                })
            })
            .transpose()?
            .map_or(
                Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
                Duration::from_secs,
            );
        let log_format = LogFormat::parse(get_optional_env("LOG_FORMAT").as_deref());

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.2);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            email,
            storage,
            github,
            google,
            cache_ttl,
            log_format,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Absolute URL for a path on this site.
    #[must_use]
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl EmailConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("SMTP_FROM");

        match (host, username, password, from) {
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                let smtp_port = get_env_or_default("SMTP_PORT", "587")
                    .parse::<u16>()
                    .map_err(|e| {
                        ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string())
                    })?;
                if let Err(e) = validate_secret_strength(&password, "SMTP_PASSWORD") {
                    tracing::warn!("SMTP_PASSWORD validation warning: {e}");
                }
                Ok(Some(Self {
                    smtp_host,
                    smtp_port,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SMTP_*".to_string(),
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD and SMTP_FROM must be set together"
                    .to_string(),
            )),
        }
    }
}

impl StorageConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let endpoint = get_optional_env("STORAGE_ENDPOINT");
        let region = get_optional_env("STORAGE_REGION");
        let bucket = get_optional_env("STORAGE_BUCKET");
        let access_key_id = get_optional_env("STORAGE_ACCESS_KEY_ID");
        let secret = get_optional_env("STORAGE_SECRET_ACCESS_KEY");

        match (endpoint, region, bucket, access_key_id, secret) {
            (Some(endpoint), Some(region), Some(bucket), Some(access_key_id), Some(secret)) => {
                validate_secret_strength(&secret, "STORAGE_SECRET_ACCESS_KEY")?;
                let endpoint = endpoint.trim_end_matches('/').to_string();
                let public_url = get_optional_env("STORAGE_PUBLIC_URL").map_or_else(
                    || format!("{endpoint}/{bucket}"),
                    |u| u.trim_end_matches('/').to_string(),
                );
                Ok(Some(Self {
                    endpoint,
                    region,
                    bucket,
                    access_key_id,
                    secret_access_key: SecretString::from(secret),
                    public_url,
                }))
            }
            (None, None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "STORAGE_*".to_string(),
                "STORAGE_ENDPOINT, STORAGE_REGION, STORAGE_BUCKET, STORAGE_ACCESS_KEY_ID and \
                 STORAGE_SECRET_ACCESS_KEY must be set together"
                    .to_string(),
            )),
        }
    }
}

impl OAuthProviderConfig {
    /// Build a provider block from its two variables.
    fn from_parts(
        prefix: &str,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match (client_id, client_secret) {
            (Some(client_id), Some(secret)) => {
                if let Err(e) = validate_secret_strength(&secret, &format!("{prefix}_CLIENT_SECRET"))
                {
                    tracing::warn!("{prefix}_CLIENT_SECRET validation warning: {e}");
                }
                Ok(Some(Self {
                    client_id,
                    client_secret: SecretString::from(secret),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                format!("{prefix}_*"),
                format!("Both {prefix}_CLIENT_ID and {prefix}_CLIENT_SECRET must be set together"),
            )),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate `APP_BASE_URL` and strip any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("APP_BASE_URL".to_string(), e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            "APP_BASE_URL".to_string(),
            "must use http or https".to_string(),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    /// A complete configuration for tests that need an `AdminConfig`.
    pub(crate) fn test_config() -> AdminConfig {
        AdminConfig {
            database_url: SecretString::from("postgres://localhost/rx_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            session_secret: SecretString::from("k9$Tq2!vLz@8mWp#4rXn^7bYc&1sHd*J"),
            email: None,
            storage: None,
            github: None,
            google: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            log_format: LogFormat::Text,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-session-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("abababababababababababababababab", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "SESSION_SECRET").is_err());
    }

    #[test]
    fn test_oauth_provider_requires_both_values() {
        let partial =
            OAuthProviderConfig::from_parts("GITHUB", Some("client-id".to_string()), None);
        assert!(matches!(partial, Err(ConfigError::InvalidEnvVar(_, _))));

        let absent = OAuthProviderConfig::from_parts("GITHUB", None, None).unwrap();
        assert!(absent.is_none());

        let full = OAuthProviderConfig::from_parts(
            "GITHUB",
            Some("Iv1.0a1b2c3d".to_string()),
            Some("f3J9$kQ2!mZ7@pL4#xV8&wT1".to_string()),
        )
        .unwrap()
        .unwrap();
        assert_eq!(full.client_id, "Iv1.0a1b2c3d");
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://admin.pharmacy.test/").unwrap(),
            "https://admin.pharmacy.test"
        );
        assert!(normalize_base_url("ftp://admin.pharmacy.test").is_err());
        assert!(normalize_base_url("not a url").is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Text);
        assert_eq!(LogFormat::parse(None), LogFormat::Text);
    }

    #[test]
    fn test_socket_addr_and_urls() {
        let config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(!config.is_https());
        assert_eq!(
            config.absolute_url("/auth/new-verification?token=abc"),
            "http://localhost:3000/auth/new-verification?token=abc"
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = StorageConfig {
            endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
            region: "us-east-1".to_string(),
            bucket: "rx-images".to_string(),
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: SecretString::from("wJalrXUtnFEMI/K7MDENG/bPxRfiCY"),
            public_url: "https://cdn.pharmacy.test".to_string(),
        };
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("rx-images"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("wJalrXUtnFEMI"));

        let email = EmailConfig {
            smtp_host: "smtp.pharmacy.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("super_secret_smtp_password"),
            from_address: "no-reply@pharmacy.test".to_string(),
        };
        let debug_output = format!("{email:?}");
        assert!(debug_output.contains("smtp.pharmacy.test"));
        assert!(!debug_output.contains("super_secret_smtp_password"));
    }
}

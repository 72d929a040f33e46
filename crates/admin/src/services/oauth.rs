//! GitHub and Google sign-in (OAuth 2.0 authorization code flow).
//!
//! # Flow
//!
//! 1. `/auth/oauth/{provider}` stores a random `state` in the session and
//!    redirects to [`OAuthClient::authorization_url`]
//! 2. The provider redirects back with `code` and `state`
//! 3. The callback compares `state`, then calls [`OAuthClient::sign_in`],
//!    which exchanges the code and fetches the profile
//! 4. `AuthService::oauth_sign_in` links or creates the account

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use pharmacy_core::Email;

use crate::config::{AdminConfig, OAuthProviderConfig};

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// GitHub rejects API calls without a User-Agent.
const USER_AGENT: &str = concat!("pharmacy-admin/", env!("CARGO_PKG_VERSION"));

/// Supported identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OAuthProvider {
    GitHub,
    Google,
}

impl OAuthProvider {
    /// Path segment and `oauth_account.provider` value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::Google => "google",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::GitHub => "GitHub",
            Self::Google => "Google",
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OAuthProvider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::GitHub),
            "google" => Ok(Self::Google),
            other => Err(OAuthError::UnknownProvider(other.to_string())),
        }
    }
}

/// Errors from the OAuth flow.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{0} sign-in is not configured")]
    NotConfigured(OAuthProvider),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error payload or status.
    #[error("provider error: {0}")]
    Provider(String),

    /// No verified email address on the provider account.
    #[error("no verified email on the provider account")]
    MissingEmail,

    #[error("invalid email from provider: {0}")]
    InvalidEmail(#[from] pharmacy_core::EmailError),
}

/// The identity returned by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider: OAuthProvider,
    /// Stable account ID at the provider.
    pub provider_account_id: String,
    pub email: Email,
    pub name: String,
    pub image: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider payloads
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

struct ProviderCredentials {
    client_id: String,
    client_secret: SecretString,
}

impl From<&OAuthProviderConfig> for ProviderCredentials {
    fn from(config: &OAuthProviderConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

struct OAuthClientInner {
    client: reqwest::Client,
    base_url: String,
    github: Option<ProviderCredentials>,
    google: Option<ProviderCredentials>,
}

/// Client for the configured identity providers.
#[derive(Clone)]
pub struct OAuthClient {
    inner: Arc<OAuthClientInner>,
}

impl OAuthClient {
    /// Create a client for whichever providers are configured.
    #[must_use]
    pub fn new(config: &AdminConfig) -> Self {
        Self {
            inner: Arc::new(OAuthClientInner {
                client: reqwest::Client::new(),
                base_url: config.base_url.clone(),
                github: config.github.as_ref().map(Into::into),
                google: config.google.as_ref().map(Into::into),
            }),
        }
    }

    /// Providers with credentials, for rendering sign-in buttons.
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<OAuthProvider> {
        [OAuthProvider::GitHub, OAuthProvider::Google]
            .into_iter()
            .filter(|p| self.credentials(*p).is_ok())
            .collect()
    }

    fn credentials(&self, provider: OAuthProvider) -> Result<&ProviderCredentials, OAuthError> {
        match provider {
            OAuthProvider::GitHub => self.inner.github.as_ref(),
            OAuthProvider::Google => self.inner.google.as_ref(),
        }
        .ok_or(OAuthError::NotConfigured(provider))
    }

    /// Callback URL registered with the provider.
    #[must_use]
    pub fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!("{}/auth/oauth/{}/callback", self.inner.base_url, provider.as_str())
    }

    /// URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::NotConfigured` if the provider has no credentials.
    pub fn authorization_url(
        &self,
        provider: OAuthProvider,
        state: &str,
    ) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        Ok(match provider {
            OAuthProvider::GitHub => format!(
                "{GITHUB_AUTHORIZE_URL}?\
                client_id={}&\
                redirect_uri={}&\
                scope=read%3Auser%20user%3Aemail&\
                state={}",
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(&redirect_uri),
                urlencoding::encode(state)
            ),
            OAuthProvider::Google => format!(
                "{GOOGLE_AUTHORIZE_URL}?\
                client_id={}&\
                redirect_uri={}&\
                response_type=code&\
                scope=openid%20email%20profile&\
                state={}",
                urlencoding::encode(&creds.client_id),
                urlencoding::encode(&redirect_uri),
                urlencoding::encode(state)
            ),
        })
    }

    /// Exchange the callback code and fetch the provider profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange or profile request fails, or the
    /// account has no verified email.
    #[tracing::instrument(skip(self, code))]
    pub async fn sign_in(
        &self,
        provider: OAuthProvider,
        code: &str,
    ) -> Result<OAuthProfile, OAuthError> {
        let access_token = self.exchange_code(provider, code).await?;
        match provider {
            OAuthProvider::GitHub => self.github_profile(&access_token).await,
            OAuthProvider::Google => self.google_profile(&access_token).await,
        }
    }

    async fn exchange_code(&self, provider: OAuthProvider, code: &str) -> Result<String, OAuthError> {
        let creds = self.credentials(provider)?;
        let redirect_uri = self.redirect_uri(provider);
        let url = match provider {
            OAuthProvider::GitHub => GITHUB_TOKEN_URL,
            OAuthProvider::Google => GOOGLE_TOKEN_URL,
        };

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.expose_secret()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
        ];

        let response = self
            .inner
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider(format!("Token exchange failed: {text}")));
        }

        let token: TokenResponse = response.json().await?;
        token.access_token.ok_or_else(|| {
            OAuthError::Provider(
                token
                    .error_description
                    .or(token.error)
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )
        })
    }

    async fn github_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let user: GitHubUser = self
            .inner
            .client
            .get(format!("{GITHUB_API_URL}/user"))
            .bearer_auth(access_token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The public profile email can be hidden; fall back to the primary
        // verified address.
        let email = match user.email {
            Some(email) => email,
            None => {
                let emails: Vec<GitHubEmail> = self
                    .inner
                    .client
                    .get(format!("{GITHUB_API_URL}/user/emails"))
                    .bearer_auth(access_token)
                    .header(reqwest::header::USER_AGENT, USER_AGENT)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                primary_verified_email(emails).ok_or(OAuthError::MissingEmail)?
            }
        };

        Ok(OAuthProfile {
            provider: OAuthProvider::GitHub,
            provider_account_id: user.id.to_string(),
            email: Email::parse(&email)?,
            name: user.name.filter(|n| !n.trim().is_empty()).unwrap_or(user.login),
            image: user.avatar_url,
        })
    }

    async fn google_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let info: GoogleUserInfo = self
            .inner
            .client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let email = info
            .email
            .filter(|_| info.email_verified)
            .ok_or(OAuthError::MissingEmail)?;
        let email = Email::parse(&email)?;
        let name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.as_str().split('@').next().unwrap_or_default().to_string());

        Ok(OAuthProfile {
            provider: OAuthProvider::Google,
            provider_account_id: info.sub,
            email,
            name,
            image: info.picture,
        })
    }
}

fn primary_verified_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

/// Random alphanumeric string for the OAuth `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    use rand::Rng;

    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..32)
        .filter_map(|_| CHARSET.get(rng.random_range(0..CHARSET.len())))
        .map(|b| char::from(*b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;

    fn client_with_github() -> OAuthClient {
        let mut config = test_config();
        config.github = Some(OAuthProviderConfig {
            client_id: "gh-client".to_string(),
            client_secret: SecretString::from("gh-secret"),
        });
        config.google = None;
        OAuthClient::new(&config)
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("github".parse::<OAuthProvider>().ok(), Some(OAuthProvider::GitHub));
        assert_eq!("google".parse::<OAuthProvider>().ok(), Some(OAuthProvider::Google));
        assert!("facebook".parse::<OAuthProvider>().is_err());
    }

    #[test]
    fn test_github_authorization_url() {
        let client = client_with_github();
        let url = client
            .authorization_url(OAuthProvider::GitHub, "abc123")
            .expect("configured");
        assert!(url.starts_with("https://github.com/login/oauth/authorize?client_id=gh-client&"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains(&format!(
            "redirect_uri={}",
            urlencoding::encode(&client.redirect_uri(OAuthProvider::GitHub))
        )));
    }

    #[test]
    fn test_unconfigured_provider() {
        let client = client_with_github();
        assert_eq!(client.enabled_providers(), vec![OAuthProvider::GitHub]);
        assert!(matches!(
            client.authorization_url(OAuthProvider::Google, "s"),
            Err(OAuthError::NotConfigured(OAuthProvider::Google))
        ));
    }

    #[test]
    fn test_primary_verified_email() {
        let emails = vec![
            GitHubEmail {
                email: "old@pharmacy.test".to_string(),
                primary: false,
                verified: true,
            },
            GitHubEmail {
                email: "main@pharmacy.test".to_string(),
                primary: true,
                verified: true,
            },
        ];
        assert_eq!(
            primary_verified_email(emails).as_deref(),
            Some("main@pharmacy.test")
        );
    }

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

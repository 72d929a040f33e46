//! Business logic services for admin.
//!
//! # Services
//!
//! - `auth` - Email/password accounts, verification, 2FA codes and password resets
//! - `cache` - Tagged `moka` cache for list pages and the dashboard
//! - `dashboard` - Dashboard figures and period comparisons
//! - `email` - Email delivery via SMTP
//! - `oauth` - GitHub and Google sign-in
//! - `uploads` - Presigned S3 uploads for product images

pub mod auth;
pub mod cache;
pub mod dashboard;
pub mod email;
pub mod oauth;
pub mod uploads;

pub use auth::{AuthError, AuthService, LoginOutcome};
pub use cache::{CacheKey, CacheTag, CacheValue, QueryCache};
pub use dashboard::DashboardService;
pub use email::{EmailError, EmailService};
pub use oauth::{OAuthClient, OAuthError, OAuthProvider};
pub use uploads::{SignedUpload, UploadError, UploadSigner};

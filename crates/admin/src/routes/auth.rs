//! Authentication route handlers.
//!
//! Handles credentials login (with emailed two-factor codes), registration,
//! email confirmation, password reset and GitHub/Google OAuth sign-in.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::{AppError, clear_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAdminAuth, clear_current_admin, set_current_admin};
use crate::models::{CurrentAdmin, PendingLogin, User, session_keys};
use crate::services::oauth::generate_state;
use crate::services::{AuthError, CacheTag, LoginOutcome, OAuthProvider};
use crate::state::AppState;

use super::{Flash, MessageQuery, redirect_error, redirect_success};

/// Cached views that list accounts or count sign-ups.
pub(super) const ACCOUNT_TAGS: &[CacheTag] =
    &[CacheTag::Users, CacheTag::Orders, CacheTag::Dashboard];

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
///
/// The first step posts `email` and `password`; the two-factor step posts
/// only `code`.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub code: Option<String>,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Reset request form data.
#[derive(Debug, Deserialize)]
pub struct ResetForm {
    pub email: String,
}

/// New password form data.
#[derive(Debug, Deserialize)]
pub struct NewPasswordForm {
    pub token: String,
    pub password: String,
}

// =============================================================================
// Query Types
// =============================================================================

/// Query carrying an emailed token.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
    pub error: Option<String>,
}

/// Provider callback parameters.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub flash: Flash,
    pub providers: Vec<OAuthProvider>,
    pub email: String,
    /// Second step: show the code input only.
    pub two_factor: bool,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub flash: Flash,
    pub providers: Vec<OAuthProvider>,
}

/// Email confirmation result page.
#[derive(Template, WebTemplate)]
#[template(path = "auth/new_verification.html")]
pub struct NewVerificationTemplate {
    pub flash: Flash,
}

/// Reset request page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/reset.html")]
pub struct ResetTemplate {
    pub flash: Flash,
}

/// New password page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/new_password.html")]
pub struct NewPasswordTemplate {
    pub flash: Flash,
    pub token: String,
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page.
pub async fn login_page(
    OptionalAdminAuth(current): OptionalAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Response {
    if current.is_some_and(|c| c.is_admin()) {
        return Redirect::to("/").into_response();
    }
    LoginTemplate {
        flash: query.into(),
        providers: state.oauth().enabled_providers(),
        email: String::new(),
        two_factor: false,
    }
    .into_response()
}

/// Handle login form submission.
///
/// A two-factor account gets the login page back with a code input. The
/// account waiting for its code lives in the session, never in the form.
#[tracing::instrument(skip(state, session, form), fields(email = %form.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    if let Some(code) = form.code.as_deref() {
        return confirm_code(&state, &session, code).await;
    }

    match state.auth().login(&form.email, &form.password).await {
        Ok(LoginOutcome::Authenticated(user)) => Ok(sign_in(&session, &user).await),
        Ok(LoginOutcome::VerificationSent) => {
            Ok(redirect_success("/auth/login", "verification_sent"))
        }
        Ok(LoginOutcome::TwoFactorRequired(pending)) => {
            session.insert(session_keys::PENDING_LOGIN, &pending).await?;
            Ok(two_factor_page(&state, &pending, Flash::default()))
        }
        Err(e) if !e.is_server_error() => {
            tracing::warn!("Login failed: {}", e);
            Ok(redirect_error("/auth/login", e.code()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Second login step: check the emailed code for the pending account.
async fn confirm_code(
    state: &AppState,
    session: &Session,
    code: &str,
) -> Result<Response, AppError> {
    let Some(pending) = session
        .get::<PendingLogin>(session_keys::PENDING_LOGIN)
        .await?
    else {
        return Ok(redirect_error("/auth/login", "login_expired"));
    };

    let auth = state.auth();
    match auth.verify_two_factor(&pending, code).await {
        Ok(user) => {
            session
                .remove::<PendingLogin>(session_keys::PENDING_LOGIN)
                .await?;
            if !auth.consume_two_factor_confirmation(user.id).await? {
                tracing::warn!(user_id = %user.id, "Two-factor confirmation already spent");
                return Ok(redirect_error("/auth/login", "login_expired"));
            }
            Ok(sign_in(session, &user).await)
        }
        Err(e @ (AuthError::InvalidCode | AuthError::CodeExpired)) => {
            tracing::warn!(user_id = %pending.user_id, "Login code rejected: {}", e);
            let flash = Flash::error(super::flash_message(e.code()));
            Ok(two_factor_page(state, &pending, flash))
        }
        Err(e) if !e.is_server_error() => {
            session
                .remove::<PendingLogin>(session_keys::PENDING_LOGIN)
                .await?;
            Ok(redirect_error("/auth/login", e.code()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Store the account in a fresh session and go to the dashboard.
async fn sign_in(session: &Session, user: &User) -> Response {
    if let Err(e) = set_current_admin(session, &CurrentAdmin::from(user)).await {
        tracing::error!("Failed to set session: {}", e);
        return redirect_error("/auth/login", "session");
    }
    tracing::info!(user_id = %user.id, role = %user.role, "Signed in");
    Redirect::to("/").into_response()
}

fn two_factor_page(state: &AppState, pending: &PendingLogin, flash: Flash) -> Response {
    LoginTemplate {
        flash,
        providers: state.oauth().enabled_providers(),
        email: pending.email.to_string(),
        two_factor: true,
    }
    .into_response()
}

/// Handle logout.
pub async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_admin(&session).await {
        tracing::error!("Failed to clear session: {}", e);
    }
    clear_sentry_user();
    redirect_success("/auth/login", "logged_out")
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page.
pub async fn register_page(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> impl IntoResponse {
    RegisterTemplate {
        flash: query.into(),
        providers: state.oauth().enabled_providers(),
    }
}

/// Handle registration form submission.
#[tracing::instrument(skip(state, form), fields(email = %form.email))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, AppError> {
    match state
        .auth()
        .register(&form.name, &form.email, &form.password)
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "Account registered");
            state.cache().revalidate_many(ACCOUNT_TAGS);
            Ok(redirect_success("/auth/login", "confirmation_sent"))
        }
        Err(e) if !e.is_server_error() => {
            tracing::warn!("Registration failed: {}", e);
            Ok(redirect_error("/auth/register", e.code()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Confirm an email address from the emailed link.
#[tracing::instrument(skip(state, query))]
pub async fn new_verification(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<NewVerificationTemplate, AppError> {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return Ok(NewVerificationTemplate {
            flash: Flash::error(super::flash_message("missing_token")),
        });
    };

    let flash = match state.auth().new_verification(&token).await {
        Ok(()) => {
            state.cache().revalidate_many(ACCOUNT_TAGS);
            Flash {
                error: None,
                success: Some(super::flash_message("email_verified")),
            }
        }
        Err(e) if !e.is_server_error() => Flash::error(super::flash_message(e.code())),
        Err(e) => return Err(e.into()),
    };
    Ok(NewVerificationTemplate { flash })
}

// =============================================================================
// Password Reset Routes
// =============================================================================

/// Display the reset request page.
pub async fn reset_page(Query(query): Query<MessageQuery>) -> impl IntoResponse {
    ResetTemplate {
        flash: query.into(),
    }
}

/// Email a reset link.
#[tracing::instrument(skip(state, form), fields(email = %form.email))]
pub async fn reset(
    State(state): State<AppState>,
    Form(form): Form<ResetForm>,
) -> Result<Response, AppError> {
    match state.auth().request_password_reset(&form.email).await {
        Ok(()) => Ok(redirect_success("/auth/reset", "reset_sent")),
        Err(e) if !e.is_server_error() => Ok(redirect_error("/auth/reset", e.code())),
        Err(e) => Err(e.into()),
    }
}

/// Display the new password page.
pub async fn new_password_page(Query(query): Query<TokenQuery>) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return redirect_error("/auth/reset", "missing_token");
    };
    NewPasswordTemplate {
        flash: MessageQuery {
            error: query.error,
            success: None,
        }
        .into(),
        token,
    }
    .into_response()
}

/// Store a new password from a reset link.
#[tracing::instrument(skip(state, form))]
pub async fn new_password(
    State(state): State<AppState>,
    Form(form): Form<NewPasswordForm>,
) -> Result<Response, AppError> {
    match state.auth().new_password(&form.token, &form.password).await {
        Ok(()) => Ok(redirect_success("/auth/login", "password_updated")),
        Err(e @ (AuthError::TokenNotFound | AuthError::TokenExpired)) => {
            Ok(redirect_error("/auth/reset", e.code()))
        }
        Err(e) if !e.is_server_error() => {
            let path = format!(
                "/auth/new-password?token={}",
                urlencoding::encode(&form.token)
            );
            Ok(redirect_error(&path, e.code()))
        }
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// OAuth Routes
// =============================================================================

/// Send the browser to the provider's consent screen.
#[tracing::instrument(skip(state, session))]
pub async fn oauth_start(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
) -> Result<Response, AppError> {
    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        return Ok(redirect_error("/auth/login", "oauth_unavailable"));
    };

    let csrf_state = generate_state();
    let url = match state.oauth().authorization_url(provider, &csrf_state) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("OAuth start failed: {}", e);
            return Ok(redirect_error("/auth/login", "oauth_unavailable"));
        }
    };
    session.insert(session_keys::OAUTH_STATE, &csrf_state).await?;

    Ok(Redirect::to(&url).into_response())
}

/// Complete an OAuth sign-in.
///
/// The `state` parameter must match the value stored by [`oauth_start`];
/// it is removed from the session either way.
#[tracing::instrument(skip(state, session, query))]
pub async fn oauth_callback(
    State(state): State<AppState>,
    session: Session,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<Response, AppError> {
    let expected: Option<String> = session.remove(session_keys::OAUTH_STATE).await?;

    let Ok(provider) = provider.parse::<OAuthProvider>() else {
        return Ok(redirect_error("/auth/login", "oauth_unavailable"));
    };
    if let Some(error) = query.error {
        tracing::info!(%provider, %error, "OAuth sign-in declined");
        return Ok(redirect_error("/auth/login", "oauth_denied"));
    }
    let (Some(code), Some(returned)) = (query.code, query.state) else {
        return Ok(redirect_error("/auth/login", "oauth_state"));
    };
    if expected.as_deref() != Some(returned.as_str()) {
        tracing::warn!(%provider, "OAuth state mismatch");
        return Ok(redirect_error("/auth/login", "oauth_state"));
    }

    let profile = match state.oauth().sign_in(provider, &code).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(%provider, error = %e, "OAuth exchange failed");
            return Ok(redirect_error("/auth/login", "oauth_failed"));
        }
    };

    let user = state.auth().oauth_sign_in(&profile).await?;
    state.cache().revalidate_many(ACCOUNT_TAGS);
    set_current_admin(&session, &CurrentAdmin::from(&user)).await?;
    tracing::info!(user_id = %user.id, %provider, "Signed in with OAuth");

    Ok(Redirect::to("/").into_response())
}

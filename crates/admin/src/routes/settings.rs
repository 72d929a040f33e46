//! Account settings route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::db::UserRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::RequireAdminAuth;
use crate::models::{CurrentAdmin, User, session_keys};
use crate::services::auth::SettingsUpdate;
use crate::state::AppState;

use super::auth::ACCOUNT_TAGS;
use super::{AdminUserView, Flash, MessageQuery, redirect_error, redirect_success};

/// Settings form data.
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
    /// Checkbox: present when ticked.
    #[serde(default)]
    pub is_two_factor_enabled: Option<String>,
}

impl From<SettingsForm> for SettingsUpdate {
    fn from(form: SettingsForm) -> Self {
        Self {
            name: form.name,
            email: form.email,
            current_password: form.current_password,
            new_password: form.new_password,
            is_two_factor_enabled: form.is_two_factor_enabled.is_some(),
        }
    }
}

/// Settings page template.
#[derive(Template, WebTemplate)]
#[template(path = "settings/index.html")]
pub struct SettingsTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flash: Flash,
    pub user: User,
    /// OAuth-only accounts cannot change email, password or 2FA here.
    pub is_oauth: bool,
}

/// Settings page handler.
#[tracing::instrument(skip(admin, state))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> Result<SettingsTemplate, AppError> {
    let user = UserRepository::new(state.pool())
        .get_by_id(admin.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {}", admin.id)))?;

    Ok(SettingsTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/settings".to_string(),
        flash: query.into(),
        is_oauth: user.is_oauth_only(),
        user,
    })
}

/// Save the settings form.
///
/// The session copy of the account is refreshed so the new name shows
/// immediately.
#[tracing::instrument(skip(admin, state, session, form))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<SettingsForm>,
) -> Result<Response, AppError> {
    let update = SettingsUpdate::from(form);
    match state.auth().update_settings(admin.id, &update).await {
        Ok(outcome) => {
            let refreshed = CurrentAdmin {
                role: admin.role,
                ..CurrentAdmin::from(&outcome.user)
            };
            session
                .insert(session_keys::CURRENT_ADMIN, &refreshed)
                .await?;
            state.cache().revalidate_many(ACCOUNT_TAGS);
            tracing::info!(user_id = %admin.id, "Settings updated");

            let code = if outcome.verification_sent {
                "email_change_sent"
            } else {
                "settings_updated"
            };
            Ok(redirect_success("/settings", code))
        }
        Err(e) if !e.is_server_error() => {
            tracing::info!(user_id = %admin.id, error = %e, "Settings rejected");
            Ok(redirect_error("/settings", e.code()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unticked_two_factor_checkbox_disables() {
        let form = SettingsForm {
            name: "Dana".to_string(),
            email: Some(String::new()),
            current_password: None,
            new_password: None,
            is_two_factor_enabled: None,
        };
        let update = SettingsUpdate::from(form);
        assert!(!update.is_two_factor_enabled);
        assert_eq!(update.email.as_deref(), Some(""));
    }
}

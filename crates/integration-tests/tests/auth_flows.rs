//! Account state machine: verification, login codes, links, OAuth linking
//! and settings.
//!
//! The service tests need only `DATABASE_URL`; email goes to the log. The
//! `http_` tests also need the admin server running.
//! Run with: cargo test -p pharmacy-integration-tests -- --ignored

use pharmacy_admin::db::UserRepository;
use pharmacy_admin::models::User;
use pharmacy_admin::models::user::NewUser;
use pharmacy_admin::services::auth::{SettingsUpdate, hash_password};
use pharmacy_admin::services::oauth::OAuthProfile;
use pharmacy_admin::services::{AuthError, AuthService, EmailService, LoginOutcome, OAuthProvider};
use pharmacy_core::{Email, UserRole};
use pharmacy_integration_tests::{client, location, pool, unique, url};
use reqwest::StatusCode;
use sqlx::PgPool;

const LINK_BASE: &str = "http://localhost:3000";
const PASSWORD: &str = "secret-pass";

fn mailer() -> EmailService {
    EmailService::new(None).expect("log-only mailer")
}

fn address(prefix: &str) -> String {
    format!("{}@pharmacy.test", unique(prefix))
}

async fn create_account(
    db: &PgPool,
    email: &str,
    password: Option<&str>,
    verified: bool,
    two_factor: bool,
) -> User {
    let users = UserRepository::new(db);
    let user = users
        .create(&NewUser {
            name: "Dana".to_string(),
            email: Email::parse(email).expect("valid email"),
            password_hash: password.map(|p| hash_password(p).expect("hash")),
            image: None,
            role: UserRole::Admin,
            email_verified: verified,
        })
        .await
        .expect("create account");

    if two_factor {
        users
            .save_settings(user.id, &user.name, true, None)
            .await
            .expect("enable 2FA")
    } else {
        user
    }
}

/// The stored token for `email` in one of the token tables.
async fn token_for(db: &PgPool, table: &str, email: &str) -> Option<String> {
    sqlx::query_as::<_, (String,)>(&format!("SELECT token FROM {table} WHERE email = $1"))
        .bind(email)
        .fetch_optional(db)
        .await
        .expect("token lookup")
        .map(|(token,)| token)
}

async fn expire(db: &PgPool, table: &str, email: &str) {
    sqlx::query(&format!(
        "UPDATE {table} SET expires_at = now() - interval '1 minute' WHERE email = $1"
    ))
    .bind(email)
    .execute(db)
    .await
    .expect("expire token");
}

async fn reload(db: &PgPool, user: &User) -> User {
    UserRepository::new(db)
        .get_by_id(user.id)
        .await
        .expect("load account")
        .expect("account exists")
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_register_then_login_sends_confirmation() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("unverified");

    auth.register("Dana", &email, PASSWORD).await.expect("register");
    assert!(token_for(&db, "rx.verification_token", &email).await.is_some());

    let outcome = auth.login(&email, PASSWORD).await.expect("login");
    assert!(matches!(outcome, LoginOutcome::VerificationSent));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_register_duplicate_email() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("dupe");

    auth.register("Dana", &email, PASSWORD).await.expect("register");
    let second = auth.register("Other Dana", &email, PASSWORD).await;
    assert!(matches!(second, Err(AuthError::EmailInUse)));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_two_factor_login_steps() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("2fa");
    let user = create_account(&db, &email, Some(PASSWORD), true, true).await;

    let LoginOutcome::TwoFactorRequired(pending) = auth.login(&email, PASSWORD).await.expect("login")
    else {
        panic!("two-factor account should be asked for a code");
    };
    assert_eq!(pending.user_id, user.id);

    let code = token_for(&db, "rx.two_factor_token", &email)
        .await
        .expect("code issued");
    let wrong = if code == "000000" { "111111" } else { "000000" };
    assert!(matches!(
        auth.verify_two_factor(&pending, wrong).await,
        Err(AuthError::InvalidCode)
    ));

    expire(&db, "rx.two_factor_token", &email).await;
    assert!(matches!(
        auth.verify_two_factor(&pending, &code).await,
        Err(AuthError::CodeExpired)
    ));

    let LoginOutcome::TwoFactorRequired(pending) = auth.login(&email, PASSWORD).await.expect("login")
    else {
        panic!("expected a fresh code prompt");
    };
    let code = token_for(&db, "rx.two_factor_token", &email)
        .await
        .expect("code issued");
    let signed_in = auth
        .verify_two_factor(&pending, &code)
        .await
        .expect("code accepted");
    assert_eq!(signed_in.id, user.id);
    assert!(token_for(&db, "rx.two_factor_token", &email).await.is_none());

    // One accepted code, one session.
    assert!(auth.consume_two_factor_confirmation(user.id).await.expect("consume"));
    assert!(!auth.consume_two_factor_confirmation(user.id).await.expect("consume"));

    assert!(matches!(
        auth.login(&email, PASSWORD).await,
        Ok(LoginOutcome::TwoFactorRequired(_))
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_email_change_applies_after_confirmation() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let old_email = address("before");
    let new_email = address("after");
    let user = create_account(&db, &old_email, Some(PASSWORD), true, false).await;

    let outcome = auth
        .update_settings(
            user.id,
            &SettingsUpdate {
                name: "Dana".to_string(),
                email: Some(new_email.clone()),
                ..SettingsUpdate::default()
            },
        )
        .await
        .expect("save settings");
    assert!(outcome.verification_sent);
    assert_eq!(outcome.user.email.as_str(), old_email);

    let (token, owner): (String, Option<i32>) =
        sqlx::query_as("SELECT token, user_id FROM rx.verification_token WHERE email = $1")
            .bind(&new_email)
            .fetch_one(&db)
            .await
            .expect("email change token");
    assert_eq!(owner, Some(user.id.as_i32()));

    auth.new_verification(&token).await.expect("confirm address");
    assert_eq!(reload(&db, &user).await.email.as_str(), new_email);
    assert!(token_for(&db, "rx.verification_token", &new_email).await.is_none());
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_settings_wrong_password_leaves_account_untouched() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("keep");
    let new_email = address("never");
    let user = create_account(&db, &email, Some(PASSWORD), true, false).await;

    let result = auth
        .update_settings(
            user.id,
            &SettingsUpdate {
                name: "Renamed".to_string(),
                email: Some(new_email.clone()),
                current_password: Some("not-the-password".to_string()),
                new_password: Some("another-pass".to_string()),
                is_two_factor_enabled: true,
            },
        )
        .await;
    assert!(matches!(result, Err(AuthError::IncorrectPassword)));

    assert!(token_for(&db, "rx.verification_token", &new_email).await.is_none());
    let reloaded = reload(&db, &user).await;
    assert_eq!(reloaded.name, "Dana");
    assert!(!reloaded.is_two_factor_enabled);
    assert_eq!(reloaded.password_hash, user.password_hash);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_expired_reset_link_keeps_old_password() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("reset");
    create_account(&db, &email, Some(PASSWORD), true, false).await;

    auth.request_password_reset(&email).await.expect("request reset");
    expire(&db, "rx.password_reset_token", &email).await;
    let token = token_for(&db, "rx.password_reset_token", &email)
        .await
        .expect("reset token");

    assert!(matches!(
        auth.new_password(&token, "another-pass").await,
        Err(AuthError::TokenExpired)
    ));
    assert!(matches!(
        auth.login(&email, PASSWORD).await,
        Ok(LoginOutcome::Authenticated(_))
    ));
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_oauth_links_existing_email() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let email = address("link");
    let user = create_account(&db, &email, Some(PASSWORD), false, false).await;

    let profile = OAuthProfile {
        provider: OAuthProvider::GitHub,
        provider_account_id: unique("gh"),
        email: Email::parse(&email).expect("valid email"),
        name: "dana-gh".to_string(),
        image: None,
    };
    let linked = auth.oauth_sign_in(&profile).await.expect("sign in");
    assert_eq!(linked.id, user.id);

    let reloaded = reload(&db, &user).await;
    assert!(reloaded.is_verified());
    assert!(reloaded.password_hash.is_some());

    let again = auth.oauth_sign_in(&profile).await.expect("sign in again");
    assert_eq!(again.id, user.id);
}

#[tokio::test]
#[ignore = "Requires database"]
async fn test_oauth_only_account_settings_are_managed() {
    let db = pool().await;
    let mailer = mailer();
    let auth = AuthService::new(&db, &mailer, LINK_BASE);
    let profile = OAuthProfile {
        provider: OAuthProvider::Google,
        provider_account_id: unique("google"),
        email: Email::parse(&address("oauth")).expect("valid email"),
        name: "Dana".to_string(),
        image: None,
    };
    let user = auth.oauth_sign_in(&profile).await.expect("sign in");
    assert!(user.is_oauth_only());

    let set_password = auth
        .update_settings(
            user.id,
            &SettingsUpdate {
                name: "Dana".to_string(),
                new_password: Some("another-pass".to_string()),
                ..SettingsUpdate::default()
            },
        )
        .await;
    assert!(matches!(set_password, Err(AuthError::OAuthManaged)));

    let rename = auth
        .update_settings(
            user.id,
            &SettingsUpdate {
                name: "Dana G".to_string(),
                ..SettingsUpdate::default()
            },
        )
        .await
        .expect("name change is allowed");
    assert_eq!(rename.user.name, "Dana G");
    assert!(!rename.verification_sent);
}

#[tokio::test]
#[ignore = "Requires running admin server and database"]
async fn test_http_two_factor_code_step_posts_code_only() {
    let db = pool().await;
    let email = address("http-2fa");
    let user = create_account(&db, &email, Some(PASSWORD), true, true).await;
    let client = client();

    let resp = client
        .post(url("/auth/login"))
        .form(&[("email", email.as_str()), ("password", PASSWORD)])
        .send()
        .await
        .expect("password step");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("body");
    assert!(body.contains(r#"name="code""#));
    assert!(!body.contains(r#"name="password""#));
    assert!(!body.contains(PASSWORD));

    let code = token_for(&db, "rx.two_factor_token", &email)
        .await
        .expect("code issued");
    let resp = client
        .post(url("/auth/login"))
        .form(&[("code", code.as_str())])
        .send()
        .await
        .expect("code step");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp).as_deref(), Some("/"));

    let (left,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM rx.two_factor_confirmation WHERE user_id = $1")
            .bind(user.id.as_i32())
            .fetch_one(&db)
            .await
            .expect("confirmation count");
    assert_eq!(left, 0);
}

#[tokio::test]
#[ignore = "Requires running admin server"]
async fn test_http_code_without_pending_login_is_rejected() {
    let resp = client()
        .post(url("/auth/login"))
        .form(&[("code", "123456")])
        .send()
        .await
        .expect("code step");

    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp).as_deref(),
        Some("/auth/login?error=login_expired")
    );
}

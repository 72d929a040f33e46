//! Email service for verification links, login codes and password resets.
//!
//! Uses SMTP via lettre for delivery with Askama HTML templates. Without an
//! SMTP configuration the service logs what it would have sent, which keeps
//! local development usable.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// HTML template for the email confirmation link.
#[derive(Template)]
#[template(path = "email/verification.html")]
struct VerificationEmailHtml<'a> {
    link: &'a str,
}

/// Plain text template for the email confirmation link.
#[derive(Template)]
#[template(path = "email/verification.txt")]
struct VerificationEmailText<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/two_factor.html")]
struct TwoFactorEmailHtml<'a> {
    code: &'a str,
}

#[derive(Template)]
#[template(path = "email/two_factor.txt")]
struct TwoFactorEmailText<'a> {
    code: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    link: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    /// `None` when SMTP is not configured.
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be set up.
    pub fn new(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            tracing::warn!("SMTP not configured; emails will be logged instead of sent");
            return Ok(Self {
                mailer: None,
                from_address: "no-reply@localhost".to_string(),
            });
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer: Some(mailer),
            from_address: config.from_address.clone(),
        })
    }

    /// Whether messages actually leave the process.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Send the "confirm your email" link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification_email(&self, to: &str, link: &str) -> Result<(), EmailError> {
        let html = VerificationEmailHtml { link }.render()?;
        let text = VerificationEmailText { link }.render()?;

        self.send_multipart_email(to, "Confirm your email", &text, &html)
            .await
    }

    /// Send a 6-digit login code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_two_factor_code(&self, to: &str, code: &str) -> Result<(), EmailError> {
        let html = TwoFactorEmailHtml { code }.render()?;
        let text = TwoFactorEmailText { code }.render()?;

        self.send_multipart_email(to, "Your sign-in code", &text, &html)
            .await
    }

    /// Send the password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset_email(&self, to: &str, link: &str) -> Result<(), EmailError> {
        let html = PasswordResetEmailHtml { link }.render()?;
        let text = PasswordResetEmailText { link }.render()?;

        self.send_multipart_email(to, "Reset your password", &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let Some(mailer) = &self.mailer else {
            tracing::info!(to = %to, subject = %subject, body = %text_body, "Email not sent (SMTP disabled)");
            return Ok(());
        };

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Generate a 6-digit login code.
#[must_use]
pub fn generate_two_factor_code() -> String {
    use rand::Rng;
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_two_factor_code_format() {
        let code = generate_two_factor_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_two_factor_code_range() {
        for _ in 0..100 {
            let code: u32 = generate_two_factor_code().parse().expect("valid number");
            assert!(code >= 100_000);
            assert!(code < 1_000_000);
        }
    }

    #[test]
    fn test_templates_render_links() {
        let link = "https://admin.pharmacy.test/auth/new-verification?token=abc";
        let html = VerificationEmailHtml { link }.render().expect("renders");
        let text = PasswordResetEmailText { link }.render().expect("renders");
        assert!(html.contains(link));
        assert!(text.contains(link));
    }

    #[tokio::test]
    async fn test_disabled_mailer_logs_instead_of_sending() {
        let service = EmailService::new(None).expect("no transport needed");
        assert!(!service.is_enabled());
        service
            .send_two_factor_code("someone@pharmacy.test", "123456")
            .await
            .expect("logging never fails");
    }
}

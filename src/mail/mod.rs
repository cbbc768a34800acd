//! Transactional email service.
//!
//! Sends the account workflow emails (verification, password reset, account
//! deletion) over SMTP with both HTML and plain text bodies. Callers spawn
//! sends in the background; a mail failure never fails the originating
//! request.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::EmailConfig;

#[derive(Clone)]
pub struct MailService {
    config: EmailConfig,
}

impl MailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured and enabled
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn send_verification_email(
        &self,
        to_email: &str,
        user_name: &str,
        verify_url: &str,
    ) -> Result<()> {
        let subject = "Verify your email";
        let html_body = render_action_html(
            user_name,
            "Welcome! Please confirm your email address.",
            "To verify your email, click the button below. The link is valid for 20 minutes.",
            "Verify your email",
            verify_url,
            "Need help? Just reply to this email.",
        );
        let text_body = render_action_text(
            user_name,
            "Welcome! Please confirm your email address.",
            verify_url,
            "The link is valid for 20 minutes.",
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    pub async fn send_password_reset_email(
        &self,
        to_email: &str,
        user_name: &str,
        reset_url: &str,
    ) -> Result<()> {
        let subject = "Password reset request";
        let html_body = render_action_html(
            user_name,
            "We received a request to reset your password.",
            "Click the button below to choose a new password. The link is valid for 20 minutes.",
            "Reset password",
            reset_url,
            "Didn't request a password reset? You can ignore this email.",
        );
        let text_body = render_action_text(
            user_name,
            "We received a request to reset your password.",
            reset_url,
            "Didn't request a password reset? You can ignore this email.",
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    pub async fn send_account_deletion_email(
        &self,
        to_email: &str,
        user_name: &str,
        delete_url: &str,
    ) -> Result<()> {
        let subject = "Account deletion request";
        let html_body = render_action_html(
            user_name,
            "You requested to delete your account.",
            "Click the button below to permanently delete your account. The link is valid for 20 minutes.",
            "Delete my account",
            delete_url,
            "If you didn't request this, ignore this email and your account stays active.",
        );
        let text_body = render_action_text(
            user_name,
            "You requested to delete your account.",
            delete_url,
            "If you didn't request this, ignore this email and your account stays active.",
        );

        self.send_email(to_email, subject, &html_body, &text_body)
            .await
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        if !self.is_enabled() {
            tracing::warn!("Email not configured, skipping email to {}", to_email);
            return Ok(());
        }

        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox.parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
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

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent successfully");

        Ok(())
    }
}

/// Render the HTML version of a call-to-action email
fn render_action_html(
    user_name: &str,
    intro: &str,
    instructions: &str,
    button_text: &str,
    action_url: &str,
    outro: &str,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
</head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; margin: 0; padding: 24px; background: #f6f7f9;">
    <div style="max-width: 520px; margin: 0 auto; background: #ffffff; border-radius: 8px; padding: 32px;">
        <p style="font-size: 16px;">Hi {user_name},</p>
        <p style="font-size: 15px;">{intro}</p>
        <p style="font-size: 15px;">{instructions}</p>
        <p style="text-align: center; margin: 28px 0;">
            <a href="{action_url}" style="background: #1aae5a; color: #ffffff; padding: 12px 24px; border-radius: 6px; text-decoration: none; font-weight: 600;">{button_text}</a>
        </p>
        <p style="font-size: 13px; color: #667;">{outro}</p>
    </div>
</body>
</html>"#
    )
}

/// Render the plain text version of a call-to-action email
fn render_action_text(user_name: &str, intro: &str, action_url: &str, outro: &str) -> String {
    format!(
        "Hi {user_name},\n\n{intro}\n\nOpen this link to continue:\n{action_url}\n\n{outro}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmailConfig;

    #[test]
    fn test_unconfigured_service_is_disabled() {
        let service = MailService::new(EmailConfig::default());
        assert!(!service.is_enabled());
    }

    #[test]
    fn test_rendered_bodies_carry_the_action_url() {
        let html = render_action_html(
            "jane",
            "Welcome!",
            "Click below.",
            "Verify",
            "https://shop.example/verify/abc123",
            "Bye.",
        );
        assert!(html.contains("https://shop.example/verify/abc123"));
        assert!(html.contains("Hi jane"));

        let text = render_action_text("jane", "Welcome!", "https://shop.example/verify/abc123", "Bye.");
        assert!(text.contains("https://shop.example/verify/abc123"));
    }
}

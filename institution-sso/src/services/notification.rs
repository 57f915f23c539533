//! Security alert emails sent after SSO linkage changes.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use serde::Serialize;

use crate::config::SmtpConfig;
use super::error::NotificationError;

/// Template parameters of a `securityAlert` email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub to: String,
    pub action: String,
    pub action_described: String,
    pub message: Vec<String>,
}

impl SecurityAlert {
    pub fn subject(&self) -> String {
        format!("Security notice: {}", self.action)
    }

    pub fn text_body(&self) -> String {
        let mut body = format!(
            "We are writing to let you know that {}.\n",
            self.action_described
        );
        for line in &self.message {
            body.push('\n');
            body.push_str(line);
            body.push('\n');
        }
        body.push_str("\nIf you did not make this change, please contact support immediately.\n");
        body
    }

    pub fn html_body(&self) -> String {
        let mut body = format!(
            "<p>We are writing to let you know that {}.</p>",
            escape_html(&self.action_described)
        );
        for line in &self.message {
            body.push_str(&format!("<p>{}</p>", escape_html(line)));
        }
        body.push_str("<p>If you did not make this change, please contact support immediately.</p>");
        body
    }
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), NotificationError>;
}

pub struct SmtpNotificationChannel {
    config: SmtpConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotificationChannel {
    pub fn new(config: SmtpConfig) -> Result<Self, NotificationError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| NotificationError::Transport(format!("Failed to create SMTP relay: {}", e)))?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self { config, transport })
    }
}

#[async_trait]
impl NotificationChannel for SmtpNotificationChannel {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), NotificationError> {
        let from_mailbox: Mailbox = format!("{} <{}>", self.config.from_name, self.config.from_email)
            .parse()
            .map_err(|e| NotificationError::InvalidAddress(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = alert
            .to
            .parse()
            .map_err(|e| NotificationError::InvalidAddress(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(alert.subject())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(alert.text_body()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(alert.html_body()),
                    ),
            )
            .map_err(|e| NotificationError::Transport(format!("Failed to build message: {}", e)))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Transport(format!("Failed to send email: {}", e)))?;

        tracing::info!(action = %alert.action, "Security alert sent");
        Ok(())
    }
}

/// Channel used when SMTP is disabled: alerts are only logged.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationChannel;

#[async_trait]
impl NotificationChannel for LogNotificationChannel {
    async fn send_security_alert(&self, alert: &SecurityAlert) -> Result<(), NotificationError> {
        tracing::info!(
            action = %alert.action,
            action_described = %alert.action_described,
            "Security alert (SMTP disabled, not sent)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> SecurityAlert {
        SecurityAlert {
            to: "user@example.com".to_string(),
            action: "institutional SSO unlinked".to_string(),
            action_described: "an Institution <SSO> account was unlinked from your account".to_string(),
            message: vec!["No longer linked: a@uni.edu".to_string()],
        }
    }

    #[test]
    fn test_text_body_carries_every_message_line() {
        let body = alert().text_body();
        assert!(body.contains("was unlinked"));
        assert!(body.contains("No longer linked: a@uni.edu"));
    }

    #[test]
    fn test_html_body_is_escaped() {
        let body = alert().html_body();
        assert!(body.contains("Institution &lt;SSO&gt;"));
        assert!(!body.contains("<SSO>"));
    }

    #[test]
    fn test_serialized_parameters_use_camel_case() {
        let json = serde_json::to_value(alert()).unwrap();
        assert_eq!(json["actionDescribed"], alert().action_described);
        assert_eq!(json["message"][0], "No longer linked: a@uni.edu");
    }

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        assert!(LogNotificationChannel.send_security_alert(&alert()).await.is_ok());
    }
}

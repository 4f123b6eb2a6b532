//! `email` jobs: deliver a single message over SMTP.
//!
//! Without an SMTP host the message is written to the log instead, which is
//! what local runs and tests use.

use crate::config::SmtpSettings;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskflow::prelude::*;
use tracing::{debug, info};

/// Payload of an `email` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Send `body` as `text/html` rather than `text/plain`.
    #[serde(default)]
    pub html: bool,
}

enum Backend {
    Console,
    Smtp {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from: Mailbox,
    },
}

/// Sends `email` jobs.
pub struct EmailHandler {
    backend: Backend,
}

impl fmt::Debug for EmailHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.backend {
            Backend::Console => "console",
            Backend::Smtp { .. } => "smtp",
        };
        f.debug_struct("EmailHandler")
            .field("backend", &backend)
            .finish()
    }
}

impl EmailHandler {
    /// Log messages instead of sending them.
    #[must_use]
    pub const fn console() -> Self {
        Self {
            backend: Backend::Console,
        }
    }

    /// SMTP delivery when `settings.host` is set and not blank, console
    /// otherwise.
    ///
    /// No connection is made here; the transport connects on first send.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender address is invalid or the relay
    /// cannot be configured.
    pub fn from_settings(settings: &SmtpSettings) -> anyhow::Result<Self> {
        let Some(host) = settings
            .host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
        else {
            return Ok(Self::console());
        };

        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid smtp.from address '{}': {e}", settings.from))?;

        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(settings.port);
        if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            backend: Backend::Smtp {
                transport: builder.build(),
                from,
            },
        })
    }

    fn build_message(from: Mailbox, payload: &EmailPayload) -> Result<Message, HandlerError> {
        let to: Mailbox = payload
            .to
            .parse()
            .map_err(|e| HandlerError::new(format!("invalid recipient '{}': {e}", payload.to)))?;
        let content_type = if payload.html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        Message::builder()
            .from(from)
            .to(to)
            .subject(payload.subject.clone())
            .header(content_type)
            .body(payload.body.clone())
            .map_err(|e| HandlerError::new(format!("build message: {e}")))
    }
}

#[async_trait]
impl Handler for EmailHandler {
    async fn handle(&self, _ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        let payload: EmailPayload = serde_json::from_value(job.payload.clone())?;

        match &self.backend {
            Backend::Console => {
                info!(
                    to = %payload.to,
                    subject = %payload.subject,
                    html = payload.html,
                    "Console email sent"
                );
                debug!(body = %payload.body, "Email body");
            }
            Backend::Smtp { transport, from } => {
                let message = Self::build_message(from.clone(), &payload)?;
                transport
                    .send(message)
                    .await
                    .map_err(|e| HandlerError::new(format!("smtp send: {e}")))?;
                info!(to = %payload.to, subject = %payload.subject, "Email sent");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_job(payload: &serde_json::Value) -> Job {
        Job::new("email", payload).unwrap()
    }

    fn smtp_settings() -> SmtpSettings {
        SmtpSettings {
            host: Some("localhost".to_string()),
            port: 2525,
            username: None,
            password: None,
            from: "jobs@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_console_backend_accepts_valid_payload() {
        let handler = EmailHandler::from_settings(&SmtpSettings::default()).unwrap();
        let job = email_job(&json!({
            "to": "user@example.com",
            "subject": "Welcome",
            "body": "Hello!",
        }));

        handler.handle(&CancellationToken::new(), &job).await.unwrap();
        assert_eq!(format!("{handler:?}"), "EmailHandler { backend: \"console\" }");
    }

    #[tokio::test]
    async fn test_missing_fields_are_invalid_payload() {
        let handler = EmailHandler::console();
        let job = email_job(&json!({ "to": "user@example.com" }));

        let err = handler
            .handle(&CancellationToken::new(), &job)
            .await
            .unwrap_err();
        assert!(err.message().starts_with("invalid payload"));
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails_before_connecting() {
        let handler = EmailHandler::from_settings(&smtp_settings()).unwrap();
        let job = email_job(&json!({
            "to": "not an address",
            "subject": "Hi",
            "body": "Hello",
        }));

        let err = handler
            .handle(&CancellationToken::new(), &job)
            .await
            .unwrap_err();
        assert!(err.message().contains("invalid recipient"));
    }

    #[tokio::test]
    async fn test_blank_host_selects_console() {
        for host in ["", "   "] {
            let settings = SmtpSettings {
                host: Some(host.to_string()),
                ..smtp_settings()
            };
            let handler = EmailHandler::from_settings(&settings).unwrap();
            assert_eq!(format!("{handler:?}"), r#"EmailHandler { backend: "console" }"#);
        }
        let handler = EmailHandler::from_settings(&smtp_settings()).unwrap();
        assert_eq!(format!("{handler:?}"), r#"EmailHandler { backend: "smtp" }"#);
    }

    #[test]
    fn test_invalid_sender_is_a_setup_error() {
        let mut settings = smtp_settings();
        settings.from = "nobody".to_string();
        assert!(EmailHandler::from_settings(&settings).is_err());
    }

    #[test]
    fn test_html_flag_selects_content_type() {
        let from: Mailbox = "jobs@example.com".parse().unwrap();
        let payload = EmailPayload {
            to: "user@example.com".to_string(),
            subject: "Report".to_string(),
            body: "<p>ready</p>".to_string(),
            html: true,
        };

        let message = EmailHandler::build_message(from, &payload).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("Subject: Report"));
    }
}

//! `notification` jobs: fan a message out to a user-facing channel.

use crate::config::NotificationSettings;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use taskflow::prelude::*;
use tracing::info;

/// Delivery channel named by a notification's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Mobile push.
    Push,
    /// In-app inbox.
    InApp,
    /// Slack message.
    Slack,
    /// Discord message.
    Discord,
}

impl FromStr for Channel {
    type Err = HandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "in_app" => Ok(Self::InApp),
            "slack" => Ok(Self::Slack),
            "discord" => Ok(Self::Discord),
            other => Err(HandlerError::new(format!(
                "unknown notification type: {other}"
            ))),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Push => "push",
            Self::InApp => "in_app",
            Self::Slack => "slack",
            Self::Discord => "discord",
        })
    }
}

/// Payload of a `notification` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Recipient.
    pub user_id: String,
    /// Channel name: `push`, `in_app`, `slack` or `discord`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Headline.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Extra channel data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Delivers `notification` jobs.
#[derive(Clone, Default)]
pub struct NotificationHandler {
    settings: NotificationSettings,
}

impl fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandler")
            .field("slack", &self.settings.slack_token.is_some())
            .field("discord", &self.settings.discord_token.is_some())
            .finish()
    }
}

impl NotificationHandler {
    /// Handler using the configured channel credentials.
    #[must_use]
    pub const fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }

    /// Whether a credential is configured for a chat channel. Push and
    /// in-app delivery need none.
    fn has_token(&self, channel: Channel) -> bool {
        let token = match channel {
            Channel::Slack => self.settings.slack_token.as_deref(),
            Channel::Discord => self.settings.discord_token.as_deref(),
            Channel::Push | Channel::InApp => return true,
        };
        token.is_some_and(|token| !token.trim().is_empty())
    }
}

#[async_trait]
impl Handler for NotificationHandler {
    async fn handle(&self, _ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        let payload: NotificationPayload = serde_json::from_value(job.payload.clone())?;
        let channel: Channel = payload.kind.parse()?;

        let fields = payload.data.as_ref().map_or(0, serde_json::Map::len);
        match channel {
            Channel::Push | Channel::InApp => info!(
                %channel,
                user_id = %payload.user_id,
                title = %payload.title,
                fields,
                "Notification delivered"
            ),
            Channel::Slack | Channel::Discord => info!(
                %channel,
                message = %payload.message,
                fields,
                token_configured = self.has_token(channel),
                "Notification posted"
            ),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(kind: &str) -> Job {
        Job::new(
            "notification",
            &json!({
                "user_id": "u-1",
                "type": kind,
                "title": "Build finished",
                "message": "main is green",
            }),
        )
        .unwrap()
    }

    async fn run(handler: &NotificationHandler, job: &Job) -> Result<(), HandlerError> {
        handler.handle(&CancellationToken::new(), job).await
    }

    #[tokio::test]
    async fn test_push_and_in_app_need_no_credentials() {
        let handler = NotificationHandler::default();
        run(&handler, &notification("push")).await.unwrap();
        run(&handler, &notification("in_app")).await.unwrap();
    }

    #[tokio::test]
    async fn test_chat_channels_deliver_without_tokens() {
        let handler = NotificationHandler::default();
        assert!(!handler.has_token(Channel::Slack));
        run(&handler, &notification("slack")).await.unwrap();
        run(&handler, &notification("discord")).await.unwrap();

        let handler = NotificationHandler::new(NotificationSettings {
            slack_token: Some("xoxb-test".to_string()),
            discord_token: Some("  ".to_string()),
        });
        assert!(handler.has_token(Channel::Slack));
        assert!(!handler.has_token(Channel::Discord));
        run(&handler, &notification("slack")).await.unwrap();
        run(&handler, &notification("discord")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_type_is_an_error() {
        let err = run(&NotificationHandler::default(), &notification("pager"))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "unknown notification type: pager");
    }

    #[test]
    fn test_channel_names_round_trip() {
        for channel in [Channel::Push, Channel::InApp, Channel::Slack, Channel::Discord] {
            assert_eq!(channel.to_string().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn test_debug_hides_tokens() {
        let handler = NotificationHandler::new(NotificationSettings {
            slack_token: Some("xoxb-secret".to_string()),
            discord_token: None,
        });
        let rendered = format!("{handler:?}");
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("slack: true"));
    }
}

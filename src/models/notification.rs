//! Webhook message payloads and delivery jobs.

use serde::{Deserialize, Serialize};

/// Rendering style for outgoing messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    Text,
    #[default]
    Markdown,
}

impl std::str::FromStr for MessageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unknown message format '{other}'")),
        }
    }
}

/// Who gets @-mentioned by a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub at_mobiles: Vec<String>,
    pub is_at_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkdownContent {
    pub title: String,
    pub text: String,
}

/// Message body, tagged by `msgtype` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "msgtype", rename_all = "lowercase")]
pub enum MessageBody {
    Text { text: TextContent },
    Markdown { markdown: MarkdownContent },
}

/// Complete JSON document posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(flatten)]
    pub body: MessageBody,
    pub at: Mention,
}

impl WebhookPayload {
    pub fn text(content: impl Into<String>, at: Mention) -> Self {
        Self {
            body: MessageBody::Text {
                text: TextContent {
                    content: content.into(),
                },
            },
            at,
        }
    }

    pub fn markdown(title: impl Into<String>, text: impl Into<String>, at: Mention) -> Self {
        Self {
            body: MessageBody::Markdown {
                markdown: MarkdownContent {
                    title: title.into(),
                    text: text.into(),
                },
            },
            at,
        }
    }

    /// Short label for logs.
    pub fn summary(&self) -> &str {
        match &self.body {
            MessageBody::Text { text } => text.content.lines().next().unwrap_or_default(),
            MessageBody::Markdown { markdown } => &markdown.title,
        }
    }
}

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Tweet,
    StatsUpdate,
    /// Startup, shutdown and probe messages
    System,
}

/// A payload on its way to the webhook. Never persisted.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    pub payload: WebhookPayload,
    /// Attempts made so far
    pub attempt: u32,
}

impl NotificationJob {
    pub fn new(kind: NotificationKind, payload: WebhookPayload) -> Self {
        Self {
            kind,
            payload,
            attempt: 0,
        }
    }
}

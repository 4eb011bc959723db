//! Inbound activities
//!
//! Chat messages and notifications both become a turn; they differ only
//! in how the first message handed to the reasoner is written.

use serde::{Deserialize, Serialize};

/// Word document comments are read from the user's default drive
const DEFAULT_DRIVE_ID: &str = "default";

/// An activity delivered by the channel layer
#[derive(Clone, Serialize, Deserialize)]
pub struct InboundActivity {
    /// The user's bearer token
    pub subject_token: String,
    pub conversation_id: String,
    pub content: ActivityContent,
}

impl std::fmt::Debug for InboundActivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundActivity")
            .field("subject_token", &"<redacted>")
            .field("conversation_id", &self.conversation_id)
            .field("content", &self.content)
            .finish()
    }
}

impl InboundActivity {
    pub fn message(
        subject_token: impl Into<String>,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            subject_token: subject_token.into(),
            conversation_id: conversation_id.into(),
            content: ActivityContent::Message { text: text.into() },
        }
    }

    pub fn notification(
        subject_token: impl Into<String>,
        conversation_id: impl Into<String>,
        notification: Notification,
    ) -> Self {
        Self {
            subject_token: subject_token.into(),
            conversation_id: conversation_id.into(),
            content: ActivityContent::Notification(notification),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityContent {
    Message { text: String },
    Notification(Notification),
}

/// Structured notification payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Email {
        #[serde(default)]
        html_body: Option<String>,
        #[serde(default)]
        body: Option<String>,
    },
    DocumentComment {
        document_id: String,
        comment_id: String,
        #[serde(default)]
        text: Option<String>,
    },
    Other {
        notification_type: String,
        #[serde(default)]
        text: Option<String>,
    },
}

impl Notification {
    /// First message handed to the reasoner
    pub fn prompt(&self) -> String {
        match self {
            Notification::Email { html_body, body } => {
                let content = html_body
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .or(body.as_deref())
                    .unwrap_or_default();
                format!(
                    "You have received the following email. Please follow any instructions in it. {}",
                    content
                )
            }
            Notification::DocumentComment {
                document_id,
                comment_id,
                ..
            } => format!(
                "You have a new comment on the Word document with id '{}', comment id '{}', drive id '{}'. \
                 Please retrieve the Word document as well as the comments and return it in text format.",
                document_id, comment_id, DEFAULT_DRIVE_ID
            ),
            Notification::Other {
                notification_type,
                text,
            } => text
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("Notification received: {}", notification_type)),
        }
    }

    /// Second message, built from the reply to the first
    pub fn follow_up(&self, first_reply: &str) -> Option<String> {
        match self {
            Notification::DocumentComment { text, .. } => Some(format!(
                "You have received the following Word document content and comments. \
                 Please refer to these when responding to comment '{}'. {}",
                text.as_deref().unwrap_or_default(),
                first_reply
            )),
            _ => None,
        }
    }

    /// Reply used when the reasoner returns nothing
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            Notification::Email { .. } => "Email notification processed.",
            Notification::DocumentComment { .. } => "Word notification processed.",
            Notification::Other { .. } => "Notification processed successfully.",
        }
    }
}

/// Reply used when the reasoner returns nothing for a chat message
pub const MESSAGE_FALLBACK_REPLY: &str = "I couldn't process your request at this time.";

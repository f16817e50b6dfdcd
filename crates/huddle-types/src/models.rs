use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// External identity-service subject id. Opaque to us.
pub type UserId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OnlineUser {
    pub id: UserId,
    pub username: String,
}

/// One (emoji, user) pair in a message's aggregate reaction set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionView {
    pub emoji: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentView {
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub byte_size: i64,
    /// Download URL derived from the configured file base URL, when one is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Attachment metadata supplied with a send; the bytes already live in object
/// storage under `storage_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub byte_size: i64,
}

/// Denormalized message payload used for history snapshots and live broadcasts.
///
/// `id` is `None` only for synthetic messages (assistant answers and assistant
/// errors), which are never persisted and cannot be reacted to or threaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageView {
    pub id: Option<i64>,
    pub content: String,
    pub author_id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<i64>,
    /// Room key string of the room this message belongs to.
    pub chat_id: String,
    pub reactions: Vec<ReactionView>,
    pub attachments: Vec<AttachmentView>,
}

/// Canonicalize a DM participant pair: lexicographic order, so the room key
/// comes out identical regardless of which side initiates.
pub fn dm_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

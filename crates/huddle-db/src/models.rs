//! Database row types, mapping directly to SQLite rows. Distinct from the
//! huddle-types wire models so the storage layer stays independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

pub struct ChannelRow {
    pub id: i64,
    pub name: String,
}

/// Envelope kind tag stored in `message_ids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Message,
    DirectMessage,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::DirectMessage => "direct_message",
        }
    }
}

/// A resolved message envelope: the single kind-dispatch point for every
/// component that needs to go from a shared message id to routing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Channel {
        id: i64,
        content_id: i64,
        channel_id: i64,
        parent_id: Option<i64>,
    },
    Direct {
        id: i64,
        content_id: i64,
        participant1: String,
        participant2: String,
        parent_id: Option<i64>,
    },
}

impl Envelope {
    pub fn content_id(&self) -> i64 {
        match self {
            Envelope::Channel { content_id, .. } | Envelope::Direct { content_id, .. } => {
                *content_id
            }
        }
    }
}

/// Joined history row: envelope + content + author username.
pub struct HistoryRow {
    pub id: i64,
    pub content_id: i64,
    pub content: String,
    pub author_id: String,
    pub username: String,
    pub created_at: String,
    pub parent_id: Option<i64>,
}

/// Envelope + content ids of a freshly persisted message.
pub struct StoredMessage {
    pub id: i64,
    pub content_id: i64,
    pub created_at: String,
}

pub struct ReactionRow {
    pub content_id: i64,
    pub user_id: String,
    pub emoji: String,
}

pub struct AttachmentRow {
    pub content_id: i64,
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub byte_size: i64,
}

/// Attachment metadata to persist alongside a new message.
pub struct NewAttachment {
    pub storage_key: String,
    pub filename: String,
    pub content_type: String,
    pub byte_size: i64,
}

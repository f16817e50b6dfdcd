use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{AttachmentUpload, ChannelInfo, MessageView, OnlineUser, ReactionView, UserId};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Authenticate the connection with an identity-service token.
    Auth { token: String },

    JoinChat { channel_id: i64 },
    LeaveChat { channel_id: i64 },

    JoinDm { peer: UserId },
    LeaveDm { peer: UserId },

    JoinThread { message_id: i64, channel_id: i64 },
    LeaveThread { message_id: i64 },

    JoinDmThread { message_id: i64, peer: UserId },
    LeaveDmThread { message_id: i64, peer: UserId },

    SendMessage {
        channel_id: i64,
        content: String,
        #[serde(default)]
        parent_id: Option<i64>,
        #[serde(default)]
        attachments: Vec<AttachmentUpload>,
    },

    SendDm {
        peer: UserId,
        content: String,
        #[serde(default)]
        parent_id: Option<i64>,
        #[serde(default)]
        attachments: Vec<AttachmentUpload>,
    },

    ReactToMessage { message_id: i64, emoji: String },

    GetChannels,
    AddChannel { name: String },
    RemoveChannel { channel_id: i64 },

    ChangeUsername { new_username: String },
}

/// Why an `auth` attempt was refused. The client redirects on `DuplicateSession`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFailReason {
    InvalidCredential,
    DuplicateSession,
}

/// Events sent FROM server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    AuthSuccess { user_id: UserId, username: String },
    AuthFail { reason: AuthFailReason },

    /// Full online roster, rebroadcast to everyone on each roster change.
    UsersUpdated { users: Vec<OnlineUser> },
    /// Full identity -> username directory.
    Usernames { usernames: HashMap<UserId, String> },

    /// One-time history snapshot after joining a channel or DM room.
    ChatHistory {
        chat_id: String,
        messages: Vec<MessageView>,
    },
    /// One-time snapshot of a thread's replies.
    ThreadHistory {
        message_id: i64,
        messages: Vec<MessageView>,
    },

    NewMessage(MessageView),
    NewThreadMessage(MessageView),

    /// Recomputed aggregate reaction set for one message.
    ReactionUpdated {
        message_id: i64,
        reactions: Vec<ReactionView>,
        chat_id: String,
    },

    Channels(Vec<ChannelInfo>),

    UsernameChanged { username: String },

    /// Explicit rejection of a request that previously failed silently:
    /// the operation did not proceed, and this is the only observable effect.
    RequestRejected { reason: String },
}

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use huddle_db::Database;
use huddle_db::models::{Envelope, HistoryRow, NewAttachment};
use huddle_db::parse_timestamp;
use huddle_types::events::{ClientCommand, ServerEvent};
use huddle_types::models::{
    AttachmentUpload, AttachmentView, ChannelInfo, MessageView, ReactionView, dm_pair,
};

use crate::assist::{AssistClient, VectorRecord};
use crate::hub::{ConnId, Hub, Session};
use crate::rooms::RoomKey;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Messages sent to this channel are embedded and upserted into vector
    /// storage as a side effect.
    pub vectorize_channel_id: i64,
    /// The reserved assistant channel: sends here are never persisted.
    pub assistant_channel_id: i64,
    /// Base URL attachments resolve against for downloads, when configured.
    pub file_base_url: Option<String>,
}

#[derive(Clone)]
pub struct GatewayState {
    pub hub: Hub,
    pub db: Arc<Database>,
    pub assist: Option<AssistClient>,
    pub config: GatewayConfig,
    pub jwt_secret: String,
}

/// Validation failures. The original dropped these silently; we keep the
/// operation a no-op but tell the acting connection why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    NotAuthenticated,
    UnknownChannel,
    UnknownMessage,
    ParentMismatch,
    DmToSelf,
    NotAParticipant,
    DuplicateChannelName,
    UsernameTaken,
}

impl Reject {
    pub fn reason(self) -> &'static str {
        match self {
            Reject::NotAuthenticated => "not-authenticated",
            Reject::UnknownChannel => "unknown-channel",
            Reject::UnknownMessage => "unknown-message",
            Reject::ParentMismatch => "parent-mismatch",
            Reject::DmToSelf => "dm-to-self",
            Reject::NotAParticipant => "not-a-participant",
            Reject::DuplicateChannelName => "duplicate-channel-name",
            Reject::UsernameTaken => "username-taken",
        }
    }
}

enum HandlerError {
    Reject(Reject),
    Internal(anyhow::Error),
}

impl From<Reject> for HandlerError {
    fn from(r: Reject) -> Self {
        HandlerError::Reject(r)
    }
}

impl From<anyhow::Error> for HandlerError {
    fn from(e: anyhow::Error) -> Self {
        HandlerError::Internal(e)
    }
}

type HandlerResult = Result<(), HandlerError>;

/// Dispatch one authenticated command. Rejections are reported to the acting
/// connection; internal errors are logged and the connection stays up.
pub async fn handle_command(state: &GatewayState, conn_id: ConnId, cmd: ClientCommand) {
    let Some(session) = state.hub.session(conn_id).await else {
        state
            .hub
            .send_to(
                conn_id,
                ServerEvent::RequestRejected {
                    reason: Reject::NotAuthenticated.reason().into(),
                },
            )
            .await;
        return;
    };

    let outcome = dispatch(state, conn_id, &session, cmd).await;

    match outcome {
        Ok(()) => {}
        Err(HandlerError::Reject(reject)) => {
            state
                .hub
                .send_to(
                    conn_id,
                    ServerEvent::RequestRejected {
                        reason: reject.reason().into(),
                    },
                )
                .await;
        }
        Err(HandlerError::Internal(e)) => {
            error!("{} ({}): handler failed: {:#}", session.username, session.user_id, e);
        }
    }
}

async fn dispatch(
    state: &GatewayState,
    conn_id: ConnId,
    session: &Session,
    cmd: ClientCommand,
) -> HandlerResult {
    match cmd {
        // A second auth on a live session is a no-op.
        ClientCommand::Auth { .. } => Ok(()),

        ClientCommand::JoinChat { channel_id } => join_chat(state, conn_id, channel_id).await,
        ClientCommand::LeaveChat { channel_id } => {
            state.hub.leave(conn_id, &RoomKey::Channel(channel_id)).await;
            Ok(())
        }

        ClientCommand::JoinDm { peer } => join_dm(state, conn_id, session, &peer).await,
        ClientCommand::LeaveDm { peer } => {
            state
                .hub
                .leave(conn_id, &RoomKey::dm(&session.user_id, &peer))
                .await;
            Ok(())
        }

        ClientCommand::JoinThread {
            message_id,
            channel_id,
        } => join_thread(state, conn_id, message_id, channel_id).await,
        ClientCommand::LeaveThread { message_id } => {
            state.hub.leave(conn_id, &RoomKey::Thread(message_id)).await;
            Ok(())
        }

        ClientCommand::JoinDmThread { message_id, peer } => {
            join_dm_thread(state, conn_id, session, message_id, &peer).await
        }
        ClientCommand::LeaveDmThread { message_id, peer } => {
            state
                .hub
                .leave(
                    conn_id,
                    &RoomKey::dm_thread(&session.user_id, &peer, message_id),
                )
                .await;
            Ok(())
        }

        ClientCommand::SendMessage {
            channel_id,
            content,
            parent_id,
            attachments,
        } => send_message(state, conn_id, session, channel_id, content, parent_id, attachments).await,

        ClientCommand::SendDm {
            peer,
            content,
            parent_id,
            attachments,
        } => send_dm(state, session, &peer, content, parent_id, attachments).await,

        ClientCommand::ReactToMessage { message_id, emoji } => {
            react_to_message(state, session, message_id, &emoji).await
        }

        ClientCommand::GetChannels => {
            let channels = list_channels(state).await?;
            state.hub.send_to(conn_id, ServerEvent::Channels(channels)).await;
            Ok(())
        }
        ClientCommand::AddChannel { name } => add_channel(state, &name).await,
        ClientCommand::RemoveChannel { channel_id } => remove_channel(state, channel_id).await,

        ClientCommand::ChangeUsername { new_username } => {
            change_username(state, conn_id, session, &new_username).await
        }
    }
}

// -- Room Router --

async fn join_chat(state: &GatewayState, conn_id: ConnId, channel_id: i64) -> HandlerResult {
    if !run_db(&state.db, move |db| db.channel_exists(channel_id)).await? {
        return Err(Reject::UnknownChannel.into());
    }

    // Subscribe before the snapshot query: a message racing the join is
    // delivered at least once (live and possibly also in the snapshot),
    // never lost. Clients dedupe by message id.
    let room = RoomKey::Channel(channel_id);
    state.hub.join(conn_id, room.clone()).await;

    let rows = run_db(&state.db, move |db| db.channel_history(channel_id)).await?;
    let messages = assemble_views(state, rows, &room.to_string()).await?;

    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::ChatHistory {
                chat_id: room.to_string(),
                messages,
            },
        )
        .await;
    Ok(())
}

async fn join_dm(
    state: &GatewayState,
    conn_id: ConnId,
    session: &Session,
    peer: &str,
) -> HandlerResult {
    if peer == session.user_id {
        return Err(Reject::DmToSelf.into());
    }

    let room = RoomKey::dm(&session.user_id, peer);
    state.hub.join(conn_id, room.clone()).await;

    let (p1, p2) = dm_pair(&session.user_id, peer);
    let rows = run_db(&state.db, move |db| db.dm_history(&p1, &p2)).await?;
    let messages = assemble_views(state, rows, &room.to_string()).await?;

    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::ChatHistory {
                chat_id: room.to_string(),
                messages,
            },
        )
        .await;
    Ok(())
}

async fn join_thread(
    state: &GatewayState,
    conn_id: ConnId,
    message_id: i64,
    channel_id: i64,
) -> HandlerResult {
    match run_db(&state.db, move |db| db.parent_channel(message_id)).await? {
        None => return Err(Reject::UnknownMessage.into()),
        Some(parent_channel) if parent_channel != channel_id => {
            return Err(Reject::ParentMismatch.into());
        }
        Some(_) => {}
    }

    let room = RoomKey::Thread(message_id);
    state.hub.join(conn_id, room.clone()).await;

    let rows = run_db(&state.db, move |db| db.thread_history(channel_id, message_id)).await?;
    let messages = assemble_views(state, rows, &room.to_string()).await?;

    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::ThreadHistory {
                message_id,
                messages,
            },
        )
        .await;
    Ok(())
}

async fn join_dm_thread(
    state: &GatewayState,
    conn_id: ConnId,
    session: &Session,
    message_id: i64,
    peer: &str,
) -> HandlerResult {
    let pair = dm_pair(&session.user_id, peer);
    match run_db(&state.db, move |db| db.parent_dm_pair(message_id)).await? {
        None => return Err(Reject::UnknownMessage.into()),
        Some(parent_pair) if parent_pair != pair => return Err(Reject::ParentMismatch.into()),
        Some(_) => {}
    }

    let room = RoomKey::dm_thread(&session.user_id, peer, message_id);
    state.hub.join(conn_id, room.clone()).await;

    let (p1, p2) = pair;
    let rows = run_db(&state.db, move |db| db.dm_thread_history(&p1, &p2, message_id)).await?;
    let messages = assemble_views(state, rows, &room.to_string()).await?;

    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::ThreadHistory {
                message_id,
                messages,
            },
        )
        .await;
    Ok(())
}

// -- Message Pipeline --

async fn send_message(
    state: &GatewayState,
    conn_id: ConnId,
    session: &Session,
    channel_id: i64,
    content: String,
    parent_id: Option<i64>,
    attachments: Vec<AttachmentUpload>,
) -> HandlerResult {
    if channel_id == state.config.assistant_channel_id {
        answer_assistant_query(state, conn_id, channel_id, &content).await;
        return Ok(());
    }

    if !run_db(&state.db, move |db| db.channel_exists(channel_id)).await? {
        return Err(Reject::UnknownChannel.into());
    }

    if let Some(parent) = parent_id {
        match run_db(&state.db, move |db| db.parent_channel(parent)).await? {
            Some(parent_channel) if parent_channel == channel_id => {}
            _ => return Err(Reject::ParentMismatch.into()),
        }
    }

    let new_attachments = to_new_attachments(&attachments);
    let author = session.user_id.clone();
    let body = content.clone();
    let stored = run_db(&state.db, move |db| {
        db.insert_channel_message(channel_id, &author, &body, parent_id, &new_attachments)
    })
    .await?;

    let room = match parent_id {
        Some(parent) => RoomKey::Thread(parent),
        None => RoomKey::Channel(channel_id),
    };

    let view = MessageView {
        id: Some(stored.id),
        content: content.clone(),
        author_id: session.user_id.clone(),
        username: session.username.clone(),
        created_at: parse_timestamp(&stored.created_at),
        parent_id,
        chat_id: room.to_string(),
        reactions: vec![],
        attachments: attachments
            .iter()
            .map(|a| attachment_view(a, state.config.file_base_url.as_deref()))
            .collect(),
    };

    // Vectorization side-call: fire and forget, failures never fail the send.
    if channel_id == state.config.vectorize_channel_id {
        if let Some(assist) = state.assist.clone() {
            let record = VectorRecord {
                message_id: stored.id,
                content,
                author_id: session.user_id.clone(),
                channel_id,
                created_at: view.created_at,
                parent_id,
            };
            tokio::spawn(async move {
                if let Err(e) = assist.vectorize(&record).await {
                    warn!("Vectorize side-call failed for message {}: {:#}", record.message_id, e);
                }
            });
        }
    }

    let event = match parent_id {
        Some(_) => ServerEvent::NewThreadMessage(view),
        None => ServerEvent::NewMessage(view),
    };
    state.hub.send_room(&room, event).await;
    Ok(())
}

async fn send_dm(
    state: &GatewayState,
    session: &Session,
    peer: &str,
    content: String,
    parent_id: Option<i64>,
    attachments: Vec<AttachmentUpload>,
) -> HandlerResult {
    if peer == session.user_id {
        return Err(Reject::DmToSelf.into());
    }

    let (p1, p2) = dm_pair(&session.user_id, peer);

    if let Some(parent) = parent_id {
        match run_db(&state.db, move |db| db.parent_dm_pair(parent)).await? {
            Some(parent_pair) if parent_pair == (p1.clone(), p2.clone()) => {}
            _ => return Err(Reject::ParentMismatch.into()),
        }
    }

    let new_attachments = to_new_attachments(&attachments);
    let author = session.user_id.clone();
    let body = content.clone();
    let (ip1, ip2) = (p1.clone(), p2.clone());
    let stored = run_db(&state.db, move |db| {
        db.insert_direct_message(&ip1, &ip2, &author, &body, parent_id, &new_attachments)
    })
    .await?;

    let room = match parent_id {
        Some(parent) => RoomKey::dm_thread(&p1, &p2, parent),
        None => RoomKey::dm(&p1, &p2),
    };

    let view = MessageView {
        id: Some(stored.id),
        content,
        author_id: session.user_id.clone(),
        username: session.username.clone(),
        created_at: parse_timestamp(&stored.created_at),
        parent_id,
        chat_id: room.to_string(),
        reactions: vec![],
        attachments: attachments
            .iter()
            .map(|a| attachment_view(a, state.config.file_base_url.as_deref()))
            .collect(),
    };

    let event = match parent_id {
        Some(_) => ServerEvent::NewThreadMessage(view),
        None => ServerEvent::NewMessage(view),
    };
    state.hub.send_room(&room, event).await;
    Ok(())
}

/// The reserved assistant channel: nothing is persisted; the answer (or the
/// failure) goes back to the requesting connection only.
async fn answer_assistant_query(
    state: &GatewayState,
    conn_id: ConnId,
    channel_id: i64,
    query: &str,
) {
    let chat_id = RoomKey::Channel(channel_id).to_string();

    let view = match &state.assist {
        None => synthetic_message(
            &chat_id,
            "The assistant is not configured on this server.".to_string(),
            vec![],
        ),
        Some(assist) => match assist.answer(query).await {
            Ok(answer) => {
                let mut content = answer.answer;
                for source in &answer.cited_sources {
                    content.push_str(&format!(
                        "\n> [{}] {}: {}",
                        source.created_at, source.author_id, source.content
                    ));
                }
                let attachments = answer
                    .cited_document_keys
                    .iter()
                    .map(|key| cited_document_view(key, state.config.file_base_url.as_deref()))
                    .collect();
                synthetic_message(&chat_id, content, attachments)
            }
            Err(e) => {
                warn!("Assistant query failed: {:#}", e);
                synthetic_message(
                    &chat_id,
                    "Sorry, I couldn't answer that right now.".to_string(),
                    vec![],
                )
            }
        },
    };

    state.hub.send_to(conn_id, ServerEvent::NewMessage(view)).await;
}

fn synthetic_message(chat_id: &str, content: String, attachments: Vec<AttachmentView>) -> MessageView {
    MessageView {
        id: None,
        content,
        author_id: "assistant".into(),
        username: "assistant".into(),
        created_at: Utc::now(),
        parent_id: None,
        chat_id: chat_id.to_string(),
        reactions: vec![],
        attachments,
    }
}

// -- Reaction Aggregator --

async fn react_to_message(
    state: &GatewayState,
    session: &Session,
    message_id: i64,
    emoji: &str,
) -> HandlerResult {
    let envelope = run_db(&state.db, move |db| db.resolve_envelope(message_id))
        .await?
        .ok_or(Reject::UnknownMessage)?;

    let room = match &envelope {
        Envelope::Channel {
            channel_id,
            parent_id,
            ..
        } => match parent_id {
            Some(parent) => RoomKey::Thread(*parent),
            None => RoomKey::Channel(*channel_id),
        },
        Envelope::Direct {
            participant1,
            participant2,
            parent_id,
            ..
        } => {
            if session.user_id != *participant1 && session.user_id != *participant2 {
                return Err(Reject::NotAParticipant.into());
            }
            match parent_id {
                Some(parent) => RoomKey::dm_thread(participant1, participant2, *parent),
                None => RoomKey::dm(participant1, participant2),
            }
        }
    };

    let content_id = envelope.content_id();
    let user_id = session.user_id.clone();
    let emoji_owned = emoji.to_string();
    let reactions = run_db(&state.db, move |db| {
        db.toggle_reaction(content_id, &user_id, &emoji_owned)?;
        db.reactions_for_content(content_id)
    })
    .await?;

    let reactions = reactions
        .into_iter()
        .map(|r| ReactionView {
            emoji: r.emoji,
            user_id: r.user_id,
        })
        .collect();

    state
        .hub
        .send_room(
            &room,
            ServerEvent::ReactionUpdated {
                message_id,
                reactions,
                chat_id: room.to_string(),
            },
        )
        .await;
    Ok(())
}

// -- Channel Registry --

async fn list_channels(state: &GatewayState) -> Result<Vec<ChannelInfo>, HandlerError> {
    let rows = run_db(&state.db, |db| db.list_channels()).await?;
    Ok(rows
        .into_iter()
        .map(|c| ChannelInfo {
            id: c.id,
            name: c.name,
        })
        .collect())
}

async fn add_channel(state: &GatewayState, name: &str) -> HandlerResult {
    let name = name.trim().to_string();
    if run_db(&state.db, move |db| db.add_channel(&name)).await?.is_none() {
        return Err(Reject::DuplicateChannelName.into());
    }

    let channels = list_channels(state).await?;
    state.hub.broadcast_all(ServerEvent::Channels(channels)).await;
    Ok(())
}

async fn remove_channel(state: &GatewayState, channel_id: i64) -> HandlerResult {
    if !run_db(&state.db, move |db| db.remove_channel(channel_id)).await? {
        return Err(Reject::UnknownChannel.into());
    }

    let channels = list_channels(state).await?;
    state.hub.broadcast_all(ServerEvent::Channels(channels)).await;
    Ok(())
}

// -- Session Manager --

async fn change_username(
    state: &GatewayState,
    conn_id: ConnId,
    session: &Session,
    new_username: &str,
) -> HandlerResult {
    let user_id = session.user_id.clone();
    let name = new_username.to_string();
    if !run_db(&state.db, move |db| db.rename_user(&user_id, &name)).await? {
        return Err(Reject::UsernameTaken.into());
    }

    state.hub.set_username(conn_id, new_username).await;
    state
        .hub
        .send_to(
            conn_id,
            ServerEvent::UsernameChanged {
                username: new_username.to_string(),
            },
        )
        .await;
    broadcast_roster(state).await;
    Ok(())
}

/// Rebroadcast the full roster and directory. Every roster change is observed
/// by all connected clients, not just the acting one.
pub async fn broadcast_roster(state: &GatewayState) {
    let users = state.hub.roster().await;
    let usernames = state.hub.directory().await;
    state.hub.broadcast_all(ServerEvent::UsersUpdated { users }).await;
    state.hub.broadcast_all(ServerEvent::Usernames { usernames }).await;
}

// -- helpers --

/// Run a blocking DB closure off the async runtime.
async fn run_db<T, F>(db: &Arc<Database>, f: F) -> Result<T, anyhow::Error>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {e}"))?
}

fn to_new_attachments(attachments: &[AttachmentUpload]) -> Vec<NewAttachment> {
    attachments
        .iter()
        .map(|a| NewAttachment {
            storage_key: a.storage_key.clone(),
            filename: a.filename.clone(),
            content_type: a.content_type.clone(),
            byte_size: a.byte_size,
        })
        .collect()
}

fn attachment_view(upload: &AttachmentUpload, file_base_url: Option<&str>) -> AttachmentView {
    AttachmentView {
        storage_key: upload.storage_key.clone(),
        filename: upload.filename.clone(),
        content_type: upload.content_type.clone(),
        byte_size: upload.byte_size,
        url: download_url(&upload.storage_key, file_base_url),
    }
}

fn cited_document_view(storage_key: &str, file_base_url: Option<&str>) -> AttachmentView {
    let filename = storage_key
        .rsplit('/')
        .next()
        .unwrap_or(storage_key)
        .to_string();
    AttachmentView {
        storage_key: storage_key.to_string(),
        filename,
        content_type: "application/octet-stream".into(),
        byte_size: 0,
        url: download_url(storage_key, file_base_url),
    }
}

fn download_url(storage_key: &str, file_base_url: Option<&str>) -> Option<String> {
    file_base_url.map(|base| format!("{}/{}", base.trim_end_matches('/'), storage_key))
}

/// Build denormalized message views for a history snapshot: batch-fetch
/// reactions and attachments for all content rows, then zip them in.
async fn assemble_views(
    state: &GatewayState,
    rows: Vec<HistoryRow>,
    chat_id: &str,
) -> Result<Vec<MessageView>, anyhow::Error> {
    use std::collections::HashMap;

    let content_ids: Vec<i64> = rows.iter().map(|r| r.content_id).collect();
    let ids = content_ids.clone();
    let (reaction_rows, attachment_rows) = run_db(&state.db, move |db| {
        let reactions = db.reactions_for_contents(&ids)?;
        let attachments = db.attachments_for_contents(&ids)?;
        Ok((reactions, attachments))
    })
    .await?;

    let mut reactions_by_content: HashMap<i64, Vec<ReactionView>> = HashMap::new();
    for r in reaction_rows {
        reactions_by_content
            .entry(r.content_id)
            .or_default()
            .push(ReactionView {
                emoji: r.emoji,
                user_id: r.user_id,
            });
    }

    let file_base_url = state.config.file_base_url.clone();
    let mut attachments_by_content: HashMap<i64, Vec<AttachmentView>> = HashMap::new();
    for a in attachment_rows {
        attachments_by_content
            .entry(a.content_id)
            .or_default()
            .push(AttachmentView {
                url: download_url(&a.storage_key, file_base_url.as_deref()),
                storage_key: a.storage_key,
                filename: a.filename,
                content_type: a.content_type,
                byte_size: a.byte_size,
            });
    }

    Ok(rows
        .into_iter()
        .map(|row| MessageView {
            id: Some(row.id),
            content: row.content,
            author_id: row.author_id,
            username: row.username,
            created_at: parse_timestamp(&row.created_at),
            parent_id: row.parent_id,
            chat_id: chat_id.to_string(),
            reactions: reactions_by_content.remove(&row.content_id).unwrap_or_default(),
            attachments: attachments_by_content
                .remove(&row.content_id)
                .unwrap_or_default(),
        })
        .collect())
}

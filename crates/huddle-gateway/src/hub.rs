use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use huddle_types::events::ServerEvent;
use huddle_types::models::{OnlineUser, UserId};

use crate::identity::AuthError;
use crate::rooms::RoomKey;

pub type ConnId = Uuid;

/// Authenticated state attached to a live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub username: String,
}

/// Process-wide session store and room subscription table.
///
/// All writes go through the methods here (the single writer path), so the
/// backing maps could move to an external shared store without changing call
/// sites.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

struct HubInner {
    /// Per-connection outbound channels.
    conns: RwLock<HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>>,

    /// Authenticated sessions keyed by connection.
    sessions: RwLock<HashMap<ConnId, Session>>,

    /// Online set: identity -> the one connection holding its session.
    online: RwLock<HashMap<UserId, ConnId>>,

    /// Room subscriptions.
    rooms: RwLock<HashMap<RoomKey, HashSet<ConnId>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                conns: RwLock::new(HashMap::new()),
                sessions: RwLock::new(HashMap::new()),
                online: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection. Returns its id and the outbound event receiver.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.conns.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Tear down a connection: session, online entry, room subscriptions.
    /// Returns the session it held, if any.
    pub async fn unregister(&self, conn_id: ConnId) -> Option<Session> {
        self.inner.conns.write().await.remove(&conn_id);

        for members in self.inner.rooms.write().await.values_mut() {
            members.remove(&conn_id);
        }

        let session = self.inner.sessions.write().await.remove(&conn_id);

        if let Some(session) = &session {
            let mut online = self.inner.online.write().await;
            // A rejected duplicate never owned the entry; only the holder clears it.
            if online.get(&session.user_id) == Some(&conn_id) {
                online.remove(&session.user_id);
            }
        }

        session
    }

    /// Install a session for an authenticated identity, enforcing the
    /// single-session invariant: a second connection for an identity that is
    /// already online is rejected and the existing session is left untouched.
    pub async fn begin_session(
        &self,
        conn_id: ConnId,
        user_id: UserId,
        username: String,
    ) -> Result<Session, AuthError> {
        let mut online = self.inner.online.write().await;
        if online.contains_key(&user_id) {
            return Err(AuthError::DuplicateSession);
        }
        online.insert(user_id.clone(), conn_id);

        let session = Session { user_id, username };
        self.inner
            .sessions
            .write()
            .await
            .insert(conn_id, session.clone());
        Ok(session)
    }

    pub async fn session(&self, conn_id: ConnId) -> Option<Session> {
        self.inner.sessions.read().await.get(&conn_id).cloned()
    }

    pub async fn set_username(&self, conn_id: ConnId, username: &str) {
        if let Some(session) = self.inner.sessions.write().await.get_mut(&conn_id) {
            session.username = username.to_string();
        }
    }

    /// Online roster, username-sorted for deterministic broadcasts.
    pub async fn roster(&self) -> Vec<OnlineUser> {
        let mut users: Vec<OnlineUser> = self
            .inner
            .sessions
            .read()
            .await
            .values()
            .map(|s| OnlineUser {
                id: s.user_id.clone(),
                username: s.username.clone(),
            })
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        users
    }

    /// Identity -> username directory of connected users.
    pub async fn directory(&self) -> HashMap<UserId, String> {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .map(|s| (s.user_id.clone(), s.username.clone()))
            .collect()
    }

    /// Subscribe a connection to a room. Idempotent.
    pub async fn join(&self, conn_id: ConnId, key: RoomKey) {
        self.inner
            .rooms
            .write()
            .await
            .entry(key)
            .or_default()
            .insert(conn_id);
    }

    /// Unsubscribe. Idempotent; empty rooms are dropped.
    pub async fn leave(&self, conn_id: ConnId, key: &RoomKey) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(key) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(key);
            }
        }
    }

    /// Deliver an event to one connection.
    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        if let Some(tx) = self.inner.conns.read().await.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Deliver an event to every subscriber of a room.
    pub async fn send_room(&self, key: &RoomKey, event: ServerEvent) {
        let members: Vec<ConnId> = match self.inner.rooms.read().await.get(key) {
            Some(members) => members.iter().copied().collect(),
            None => return,
        };

        let conns = self.inner.conns.read().await;
        for conn_id in members {
            if let Some(tx) = conns.get(&conn_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Fan an event out to every connection. O(connections) per call, fine at
    /// this scale, and the one place to add incremental diffs if it grows.
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let conns = self.inner.conns.read().await;
        for tx in conns.values() {
            let _ = tx.send(event.clone());
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

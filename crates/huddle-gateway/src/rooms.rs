use std::fmt;

use huddle_types::models::dm_pair;

/// Broadcast scope a connection can subscribe to.
///
/// Rendered keys are prefixed by category so a channel room, a DM room, and a
/// thread room can never collide even when their underlying keys coincide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Channel(i64),
    Dm { p1: String, p2: String },
    Thread(i64),
    DmThread { p1: String, p2: String, parent: i64 },
}

impl RoomKey {
    /// DM room for two identities, canonicalized so both sides compute the
    /// same key regardless of who initiates.
    pub fn dm(a: &str, b: &str) -> Self {
        let (p1, p2) = dm_pair(a, b);
        RoomKey::Dm { p1, p2 }
    }

    pub fn dm_thread(a: &str, b: &str, parent: i64) -> Self {
        let (p1, p2) = dm_pair(a, b);
        RoomKey::DmThread { p1, p2, parent }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomKey::Channel(id) => write!(f, "channel-{id}"),
            RoomKey::Dm { p1, p2 } => write!(f, "dm-{p1}-{p2}"),
            RoomKey::Thread(parent) => write!(f, "thread-{parent}"),
            RoomKey::DmThread { p1, p2, parent } => write!(f, "dm-{p1}-{p2}-thread-{parent}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_key_is_canonical() {
        assert_eq!(RoomKey::dm("bob", "alice"), RoomKey::dm("alice", "bob"));
        assert_eq!(RoomKey::dm("alice", "bob").to_string(), "dm-alice-bob");
        assert_eq!(
            RoomKey::dm_thread("bob", "alice", 7),
            RoomKey::dm_thread("alice", "bob", 7)
        );
    }

    #[test]
    fn categories_never_collide() {
        // Same underlying numeric key, three distinct rooms.
        let keys = [
            RoomKey::Channel(5).to_string(),
            RoomKey::Thread(5).to_string(),
            RoomKey::Dm {
                p1: "5".into(),
                p2: "5".into(),
            }
            .to_string(),
        ];
        assert_eq!(keys.len(), 3);
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[0], keys[2]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn dm_thread_composes_dm_key() {
        assert_eq!(
            RoomKey::dm_thread("alice", "bob", 12).to_string(),
            "dm-alice-bob-thread-12"
        );
    }
}

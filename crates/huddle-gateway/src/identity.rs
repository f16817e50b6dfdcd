use jsonwebtoken::{DecodingKey, Validation, decode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use huddle_db::Database;
use huddle_types::models::UserId;

/// Authentication failures surfaced to the client as `auth-fail`.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
    /// The identity already holds a live session on another connection.
    #[error("duplicate session")]
    DuplicateSession,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Claims carried by tokens the external identity service issues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    /// Username claim, when the identity service provides one.
    #[serde(default)]
    pub preferred_username: Option<String>,
    pub exp: usize,
}

/// Verify a credential and resolve the local user, creating it lazily on
/// first sight. Returns (identity, username).
pub fn authenticate(db: &Database, secret: &str, token: &str) -> Result<(UserId, String), AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        warn!("Token verification failed: {}", e);
        AuthError::InvalidCredential
    })?;

    let claims = token_data.claims;
    let username = resolve_user(db, &claims.sub, claims.preferred_username.as_deref())?;
    Ok((claims.sub, username))
}

/// Look up the local user row, creating it on first authentication. When the
/// identity service carries no username claim we assign a generated handle.
fn resolve_user(
    db: &Database,
    user_id: &str,
    claimed_username: Option<&str>,
) -> Result<String, AuthError> {
    if let Some(user) = db.get_user_by_id(user_id).map_err(AuthError::Internal)? {
        return Ok(user.username);
    }

    // First try the claimed name, then generated handles. Collisions with an
    // existing user fall through to another generated candidate.
    let mut candidates = claimed_username.map(str::to_string);
    for _ in 0..8 {
        let candidate = candidates.take().unwrap_or_else(generate_username);
        if db
            .create_user(user_id, &candidate)
            .map_err(AuthError::Internal)?
        {
            info!("Created user {} as '{}'", user_id, candidate);
            return Ok(candidate);
        }
    }

    Err(AuthError::Internal(anyhow::anyhow!(
        "could not allocate a username for {user_id}"
    )))
}

const ADJECTIVES: &[&str] = &[
    "happy", "clever", "swift", "bright", "calm", "eager", "gentle", "kind", "lucky", "proud",
];

const NOUNS: &[&str] = &[
    "panda", "tiger", "eagle", "wolf", "fox", "bear", "hawk", "deer", "lion", "owl",
];

/// Human-readable default handle, e.g. `swift-fox-42`.
fn generate_username() -> String {
    let mut rng = rand::rng();
    let adjective = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let number: u8 = rng.random_range(0..100);
    format!("{adjective}-{noun}-{number}")
}

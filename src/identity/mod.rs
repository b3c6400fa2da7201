pub mod store;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use store::{FileSessionStore, MemorySessionStore, SessionSource};

pub const USER_KEY: &str = "user";
pub const ACTOR_FALLBACK_KEY: &str = "entrepriseId";
pub const TOKEN_KEY: &str = "token";

/// Identifier of the enterprise account whose session drives delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct IdentityResolver {
    source: Arc<dyn SessionSource>,
}

impl IdentityResolver {
    pub fn new(source: Arc<dyn SessionSource>) -> Self {
        Self { source }
    }

    /// Actor id from the persisted user object, falling back to the bare
    /// `entrepriseId` entry.
    pub fn resolve_actor_id(&self) -> Option<ActorId> {
        self.source
            .get(USER_KEY)
            .and_then(|raw| actor_from_user(&raw))
            .or_else(|| self.source.get(ACTOR_FALLBACK_KEY).and_then(ActorId::new))
    }

    pub fn auth_token(&self) -> Option<String> {
        self.source
            .get(TOKEN_KEY)
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

fn actor_from_user(raw: &str) -> Option<ActorId> {
    let user: Value = serde_json::from_str(raw).ok()?;
    match user.get("id")? {
        Value::String(id) => ActorId::new(id.as_str()),
        Value::Number(id) => ActorId::new(id.to_string()),
        _ => None,
    }
}

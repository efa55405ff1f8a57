use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display role of a stored message. The `system` role never appears here;
/// it exists only in outbound provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One message in the session transcript.
///
/// Ids are allocated monotonically by the store, so creation order and
/// display order coincide. While an assistant message is being streamed
/// into, its content only grows; the single exception is the wholesale
/// replacement with the failure notice when its stream dies.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub liked: bool,
    pub disliked: bool,
    pub copied: bool,
}

impl StoredMessage {
    pub fn new(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: Utc::now(),
            liked: false,
            disliked: false,
            copied: false,
        }
    }

    pub fn user(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    pub fn assistant(id: u64, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_messages_carry_no_reactions() {
        let msg = StoredMessage::user(1, "hi");
        assert!(!msg.liked && !msg.disliked && !msg.copied);
        assert!(msg.role.is_user());
    }

    #[test]
    fn role_strings_match_the_wire_format() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Server-assigned post id, unique across top-level posts, replies and
    /// repost targets.
    PostId
);
string_id!(UserId);
string_id!(
    /// Conversation id. The server derives it from the participant pair and
    /// the encryption flag, see [`ConversationId::for_pair`].
    ConversationId
);
string_id!(
    /// Message id, unique within its conversation.
    MessageId
);
string_id!(NotificationId);
string_id!(StoryId);

impl ConversationId {
    /// Derive the id the server assigns to the conversation between two
    /// users. Order of the arguments does not matter.
    pub fn for_pair(a: &str, b: &str, encrypted: bool) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        if encrypted {
            Self(format!("{first}:{second}:e2e"))
        } else {
            Self(format!("{first}:{second}"))
        }
    }
}

/// Local id of a login session. Minted at login, never sent to the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_is_order_independent() {
        let a = ConversationId::for_pair("alice", "bob", false);
        let b = ConversationId::for_pair("bob", "alice", false);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice:bob");
    }

    #[test]
    fn test_conversation_id_encryption_flag() {
        let plain = ConversationId::for_pair("alice", "bob", false);
        let secret = ConversationId::for_pair("alice", "bob", true);
        assert_ne!(plain, secret);
        assert_eq!(secret.as_str(), "alice:bob:e2e");
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = PostId::new("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
    }
}

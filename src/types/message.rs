use serde::{Deserialize, Serialize};

use crate::types::Role;

/// A single role-tagged message of a conversation.
///
/// This is also the wire shape of a chat-completions request message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message.
    pub role: Role,

    /// The content of the message.
    pub content: String,
}

impl Message {
    /// Create a new `Message` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a new system `Message`.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user `Message`.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant `Message`.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

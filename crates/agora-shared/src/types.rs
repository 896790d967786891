use serde::{Deserialize, Serialize};

use crate::constants::CHAT_TOPIC_PREFIX;

/// A named topic/room partitioning messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Relay topic carrying this channel's live message events.
    pub fn to_topic(&self) -> String {
        format!("{}{}", CHAT_TOPIC_PREFIX, self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Message identifier.
///
/// Either a locally generated temporary id (assigned at send time, never
/// shown to other clients) or the permanent id assigned by the server or
/// carried on a relay delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    /// Fresh temporary identifier for an optimistic send.
    pub fn temporary() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Delivery state of a message in the local sequence.
///
/// `Pending` entries are locally sent and unacknowledged; `Confirmed` is
/// terminal and covers both server-acknowledged sends and messages taken
/// from the history fetch or the relay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageState {
    Pending,
    Confirmed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_topic() {
        let channel = ChannelId::from("general");
        assert_eq!(channel.to_topic(), "chat-general");
    }

    #[test]
    fn test_temporary_ids_are_unique() {
        assert_ne!(MessageId::temporary(), MessageId::temporary());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Author;
use crate::types::{ChannelId, MessageId, MessageState};

/// Canonical message shape.
///
/// Every ingestion path (history fetch, relay delivery, optimistic send)
/// produces this shape; nothing downstream ever sees a raw record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: Author,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Weak reference to another message in the same channel. Lookup-only;
    /// a dangling reference is resolved to a placeholder at display time.
    pub reply_to: Option<MessageId>,
    pub state: MessageState,
}

/// Raw author shape as delivered by the remote API or the relay.
///
/// Field names vary between the two sources, hence the aliases; every
/// field is optional and defaulted during normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRecord {
    #[serde(default, alias = "identifier")]
    pub id: Option<String>,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    #[serde(default, alias = "photoUrl", alias = "photoURL")]
    pub avatar_url: Option<String>,
}

/// Inbound message record, shared by the history endpoint and the relay
/// `new-message` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: MessageId,
    pub text: String,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "user")]
    pub author: Option<AuthorRecord>,
    #[serde(default, alias = "replyToId")]
    pub reply_to: Option<MessageId>,
    /// Echoed back on relay deliveries of the sender's own messages.
    #[serde(default)]
    pub temporary_id: Option<MessageId>,
}

impl MessageRecord {
    /// Normalize a raw record into the canonical shape.
    ///
    /// Missing author subfields fall back to the local user's identity,
    /// then to the anonymous placeholder; a missing timestamp falls back
    /// to `now`. The result is always `Confirmed`.
    pub fn normalize(
        self,
        channel: &ChannelId,
        local_author: Option<&Author>,
        now: DateTime<Utc>,
    ) -> Message {
        let fallback = local_author.cloned().unwrap_or_else(Author::anonymous);

        let author = match self.author {
            Some(raw) => Author {
                id: raw.id.unwrap_or_else(|| fallback.id.clone()),
                display_name: raw
                    .display_name
                    .unwrap_or_else(|| fallback.display_name.clone()),
                avatar_url: raw.avatar_url.unwrap_or_else(|| fallback.avatar_url.clone()),
            },
            None => fallback,
        };

        Message {
            id: self.id,
            channel: channel.clone(),
            author,
            text: self.text,
            created_at: self.timestamp.unwrap_or(now),
            reply_to: self.reply_to,
            state: MessageState::Confirmed,
        }
    }
}

/// Payload for the message create endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub text: String,
    pub channel: ChannelId,
    pub author: Author,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<MessageId>,
    pub timestamp: DateTime<Utc>,
    pub temporary_id: MessageId,
}

/// Create acknowledgment carrying the server-assigned permanent id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAck {
    pub id: MessageId,
}

/// Envelope for events delivered on a channel's relay topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RelayEvent {
    NewMessage(MessageRecord),
}

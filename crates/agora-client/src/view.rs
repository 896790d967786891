//! Snapshot helpers for the display layer.

use agora_shared::constants::DELETED_MESSAGE_PLACEHOLDER;
use agora_shared::protocol::Message;
use agora_shared::types::MessageId;

/// Resolve a reply reference against a sequence snapshot.
///
/// Reply references are weak: the target may have been rolled back or
/// never loaded, in which case the placeholder is returned.
pub fn reply_preview(snapshot: &[Message], reply_to: &MessageId) -> String {
    snapshot
        .iter()
        .find(|m| &m.id == reply_to)
        .map(|m| format!("{}: {}", m.author.display_name, m.text))
        .unwrap_or_else(|| DELETED_MESSAGE_PLACEHOLDER.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use agora_shared::identity::Author;
    use agora_shared::types::{ChannelId, MessageState};

    use super::*;

    fn message(id: &str, text: &str) -> Message {
        Message {
            id: MessageId::from(id),
            channel: ChannelId::from("general"),
            author: Author {
                id: "u1".into(),
                display_name: "Asha".into(),
                avatar_url: String::new(),
            },
            text: text.into(),
            created_at: Utc::now(),
            reply_to: None,
            state: MessageState::Confirmed,
        }
    }

    #[test]
    fn test_reply_preview_resolves_existing_target() {
        let snapshot = vec![message("m1", "hi")];
        assert_eq!(
            reply_preview(&snapshot, &MessageId::from("m1")),
            "Asha: hi"
        );
    }

    #[test]
    fn test_reply_preview_falls_back_for_dangling_reference() {
        let snapshot = vec![message("m1", "hi")];
        assert_eq!(
            reply_preview(&snapshot, &MessageId::from("gone")),
            DELETED_MESSAGE_PLACEHOLDER
        );
    }
}

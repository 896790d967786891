use agora_shared::protocol::Message;
use agora_shared::types::{ChannelId, MessageId};

/// Notifications from the engine to the display layer.
///
/// The display reads sequence snapshots; these events only tell it when
/// and why to re-read, and carry the failure conditions it should surface
/// as non-blocking notices.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// History fetch finished and replaced the sequence.
    HistoryLoaded { channel: ChannelId, count: usize },
    /// History fetch failed; the sequence was left as-is. Not retried.
    HistoryLoadFailed { channel: ChannelId, reason: String },
    /// A peer message was appended to the sequence.
    MessageReceived(Message),
    /// An optimistic send was acknowledged and its id rewritten.
    MessageConfirmed { temporary_id: MessageId, id: MessageId },
    /// A send failed and its optimistic entry was rolled back. `text`
    /// carries the original input so the caller may offer a resend.
    SendFailed {
        channel: ChannelId,
        text: String,
        reason: String,
    },
    /// The relay stream for the channel ended unexpectedly.
    SubscriptionLost { channel: ChannelId },
}

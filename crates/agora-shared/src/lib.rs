// Domain types and wire protocol shared between the client engine and the
// network boundary.

pub mod constants;
pub mod directory;
pub mod identity;
pub mod protocol;
pub mod types;

pub use identity::{Author, UserProfile};
pub use protocol::{Message, MessageAck, MessageRecord, OutgoingMessage, RelayEvent};
pub use types::{ChannelId, MessageId, MessageState};

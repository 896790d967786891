/// Relay topic prefix for channel message streams
pub const CHAT_TOPIC_PREFIX: &str = "chat-";

/// Default HTTP port for the content proxy
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Display placeholder for a reply whose target is no longer in the sequence
pub const DELETED_MESSAGE_PLACEHOLDER: &str = "[deleted message]";

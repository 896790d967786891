//! HTTP client for the remote chat API.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use agora_shared::protocol::{MessageAck, MessageRecord, OutgoingMessage};
use agora_shared::types::ChannelId;

use crate::error::ApiError;

/// Boundary contract for the remote chat API.
///
/// The engine is generic over this trait so tests can drive it with an
/// in-memory implementation.
pub trait ChatApi: Send + Sync + 'static {
    /// Fetch the message history for one channel.
    fn fetch_history(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, ApiError>> + Send;

    /// Submit a new message; the ack carries the server-assigned id.
    fn create_message(
        &self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = Result<MessageAck, ApiError>> + Send;
}

/// Production implementation over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }
}

impl ChatApi for HttpChatApi {
    async fn fetch_history(&self, channel: &ChannelId) -> Result<Vec<MessageRecord>, ApiError> {
        let url = format!("{}/api/messages", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("channel", channel.as_str())])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let records = response
            .json::<Vec<MessageRecord>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        debug!(channel = %channel, count = records.len(), "Fetched message history");
        Ok(records)
    }

    async fn create_message(&self, message: &OutgoingMessage) -> Result<MessageAck, ApiError> {
        let url = format!("{}/api/send-message", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(message)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        let ack = response
            .json::<MessageAck>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        debug!(channel = %message.channel, id = %ack.id, "Message accepted");
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_stripped() {
        let api = HttpChatApi::new("https://chat.example.org/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.base_url, "https://chat.example.org");
    }
}

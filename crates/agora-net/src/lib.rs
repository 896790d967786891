// Network boundary: remote chat API client, push relay client, and the
// directory client with sample-data fallback.

pub mod api;
pub mod directory;
pub mod error;
pub mod relay;

pub use api::{ChatApi, HttpChatApi};
pub use directory::DirectoryClient;
pub use error::{ApiError, RelayError};
pub use relay::{PushRelay, RelayClient, Subscription};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{message}")]
    Upstream {
        message: String,
        /// Populated only outside production deployments.
        details: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The JSON failure envelope returned to callers.
    pub fn envelope(&self) -> serde_json::Value {
        match self {
            ServerError::Upstream { message, details } => {
                let mut body = serde_json::json!({ "error": message });
                if let Some(details) = details {
                    body["details"] = serde_json::Value::String(details.clone());
                }
                body
            }
            ServerError::Internal(_) => {
                serde_json::json!({ "error": "Internal server error" })
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(self.envelope())).into_response()
    }
}

//! Directory fetchers with fallback to bundled sample data.
//!
//! The content library and action hub must render something even when the
//! backing API is down, so both calls degrade to the sample sets instead
//! of surfacing an error.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use agora_shared::directory::{
    sample_organizations, sample_talks, MapPin, Organization, Talk,
};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    client: reqwest::Client,
    base_url: String,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    async fn fetch_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Talks for the content library; the sample set when the API is down
    /// or returns nothing.
    pub async fn talks(&self) -> Vec<Talk> {
        match self.fetch_list("/api/content").await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                debug!("Content API returned no items, using samples");
                sample_talks()
            }
            Err(e) => {
                warn!(error = %e, "Content API unavailable, using samples");
                sample_talks()
            }
        }
    }

    /// Organizations for the action hub; same fallback rules as [`talks`].
    ///
    /// [`talks`]: DirectoryClient::talks
    pub async fn organizations(&self) -> Vec<Organization> {
        match self.fetch_list("/api/action-hub").await {
            Ok(list) if !list.is_empty() => list,
            Ok(_) => {
                debug!("Action hub API returned no items, using samples");
                sample_organizations()
            }
            Err(e) => {
                warn!(error = %e, "Action hub API unavailable, using samples");
                sample_organizations()
            }
        }
    }

    /// Contributor pins for the community map. No sample fallback here:
    /// an empty map is meaningful, an error is surfaced.
    pub async fn map_pins(&self) -> Result<Vec<MapPin>, ApiError> {
        self.fetch_list("/api/map").await
    }

    /// Submit a new contributor pin.
    pub async fn submit_pin(&self, pin: &MapPin) -> Result<(), ApiError> {
        let url = format!("{}/api/map", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(pin)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }

        debug!(interest = %pin.interest, "Map pin submitted");
        Ok(())
    }
}

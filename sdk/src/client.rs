//! Typed HTTP client for the Foreman API
//!
//! Thin request/response wrapper around the service's three entry points.
//! Used by external callers and by the engine's own API tests.

use crate::types::{
    ConversationSnapshot, CreateConversationRequest, CreateConversationResponse,
    StopConversationResponse,
};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`ForemanClient`]
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Client for a running Foreman service
pub struct ForemanClient {
    base_url: String,
    client: reqwest::Client,
}

impl ForemanClient {
    /// Create a client against the given base URL (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Create a conversation; returns immediately with its id
    pub async fn create(
        &self,
        request: &CreateConversationRequest,
    ) -> Result<CreateConversationResponse, ClientError> {
        let url = format!("{}/conversations", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    /// Fetch the full persisted record of a conversation
    pub async fn status(&self, conversation_id: &str) -> Result<ConversationSnapshot, ClientError> {
        let url = format!("{}/conversations/{}", self.base_url, conversation_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    /// Force-stop a conversation
    pub async fn stop(&self, conversation_id: &str) -> Result<StopConversationResponse, ClientError> {
        let url = format!("{}/conversations/{}/stop", self.base_url, conversation_id);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Self::parse(response).await
    }

    /// Liveness probe
    pub async fn health(&self) -> Result<(), ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::Api {
            status: 404,
            body: "Conversation not found: xyz".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.contains("xyz"));
    }
}

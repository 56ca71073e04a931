use super::{Planner, PlannerError};
use crate::config::PlannerConfig;
use async_trait::async_trait;
use sdk::types::{Role, TranscriptEntry};
use serde_json::json;
use std::time::Duration;

/// Planner backed by an OpenAI-compatible chat-completions endpoint
pub struct ChatPlanner {
    config: PlannerConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ChatPlanner {
    /// Build a planner client from config.
    ///
    /// The API key is read from the environment variable named in
    /// `config.api_key_env`; a missing key surfaces as an auth error on the
    /// first call rather than at construction.
    pub fn new(config: PlannerConfig) -> Self {
        let api_key = std::env::var(&config.api_key_env).ok();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            config,
            api_key,
            client,
        }
    }

    /// Override the API key (tests, key rotation)
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn role_str(role: Role) -> &'static str {
        // The planner sits on the assistant side of the chat API; the
        // worker's progress reads as user input.
        match role {
            Role::System => "system",
            Role::Planner => "assistant",
            Role::Worker => "user",
        }
    }
}

#[async_trait]
impl Planner for ChatPlanner {
    async fn send(&self, transcript: &[TranscriptEntry]) -> super::Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            PlannerError::Auth(format!(
                "no API key in environment variable {}",
                self.config.api_key_env
            ))
        })?;

        let url = format!("{}/chat/completions", self.config.base_url);

        let messages: Vec<serde_json::Value> = transcript
            .iter()
            .map(|entry| {
                json!({
                    "role": Self::role_str(entry.role),
                    "content": entry.content,
                })
            })
            .collect();

        let payload = json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlannerError::Timeout
                } else {
                    PlannerError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(PlannerError::Auth(body));
            }
            return Err(PlannerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlannerError::Malformed(e.to_string()))?;

        let content = data
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| {
                PlannerError::Malformed("no choices[0].message.content in response".to_string())
            })?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_mapping() {
        assert_eq!(ChatPlanner::role_str(Role::System), "system");
        assert_eq!(ChatPlanner::role_str(Role::Planner), "assistant");
        assert_eq!(ChatPlanner::role_str(Role::Worker), "user");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let config = PlannerConfig {
            api_key_env: "FOREMAN_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            ..PlannerConfig::default()
        };
        let planner = ChatPlanner::new(config);

        let err = planner
            .send(&[TranscriptEntry::worker("hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, PlannerError::Auth(_)));
    }
}

use super::{CallError, Worker, WorkerError, WorkerEvent};
use crate::config::WorkerConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Ordered list of fields tried when extracting event text.
///
/// Worker backends disagree on where the human-readable payload lives;
/// the first non-null string wins.
const CONTENT_FIELDS: [&str; 3] = ["content", "message", "text"];

/// Worker client over the backend's HTTP API
pub struct HttpWorker {
    config: WorkerConfig,
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(config: WorkerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn map_send_error(e: reqwest::Error) -> CallError {
        if e.is_timeout() {
            CallError::Timeout
        } else {
            CallError::Network(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, CallError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(CallError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Pull the display text out of a raw event, walking the fallback chain.
    ///
    /// Checks the top-level fields first, then `args.content` for
    /// action-style events. Returns an empty string when nothing matches.
    fn extract_content(event: &serde_json::Value) -> String {
        for field in CONTENT_FIELDS {
            if let Some(text) = event.get(field).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }

        if let Some(text) = event
            .get("args")
            .and_then(|a| a.get("content"))
            .and_then(|v| v.as_str())
        {
            return text.to_string();
        }

        String::new()
    }

    fn parse_event(event: &serde_json::Value) -> std::result::Result<WorkerEvent, CallError> {
        let id = event
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| CallError::Malformed("event without numeric id".to_string()))?;

        Ok(WorkerEvent {
            id,
            content: Self::extract_content(event),
        })
    }

    /// One attempt of the latest-event fetch.
    async fn fetch_latest_once(
        &self,
        session_id: &str,
    ) -> std::result::Result<Option<WorkerEvent>, CallError> {
        let url = format!(
            "{}/api/conversations/{}/events?limit=1&order=desc",
            self.config.base_url, session_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        let response = Self::check_status(response).await?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallError::Malformed(e.to_string()))?;

        let events = data
            .as_array()
            .ok_or_else(|| CallError::Malformed("expected a JSON array of events".to_string()))?;

        match events.first() {
            Some(event) => Ok(Some(Self::parse_event(event)?)),
            None => Ok(None),
        }
    }
}

/// The backend's flaky read path answers 502/503/504 intermittently;
/// only those are worth a retry.
fn is_transient(error: &CallError) -> bool {
    matches!(error, CallError::Status { status, .. } if matches!(status, 502 | 503 | 504))
}

#[async_trait]
impl Worker for HttpWorker {
    async fn create_session(
        &self,
        initial_message: &str,
        task_metadata: &serde_json::Value,
    ) -> super::Result<String> {
        let url = format!("{}/api/conversations", self.config.base_url);

        let mut payload = json!({ "initial_user_msg": initial_message });
        if let (Some(target), Some(extra)) = (payload.as_object_mut(), task_metadata.as_object()) {
            for (key, value) in extra {
                target.insert(key.clone(), value.clone());
            }
        }

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WorkerError::CreateSession(Self::map_send_error(e)))?;
        let response = Self::check_status(response)
            .await
            .map_err(WorkerError::CreateSession)?;

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WorkerError::CreateSession(CallError::Malformed(e.to_string())))?;

        data.get("conversation_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                WorkerError::CreateSession(CallError::Malformed(
                    "no conversation_id in response".to_string(),
                ))
            })
    }

    async fn fetch_latest_event(&self, session_id: &str) -> super::Result<Option<WorkerEvent>> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_latest_once(session_id).await {
                Ok(event) => return Ok(event),
                Err(e) if is_transient(&e) && attempt < self.config.fetch_retries => {
                    attempt += 1;
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    warn!(
                        session_id,
                        attempt, "transient worker fetch failure, retrying: {}", e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(WorkerError::FetchEvent(e)),
            }
        }
    }

    async fn push_message(&self, session_id: &str, message: &str) -> super::Result<()> {
        let url = format!(
            "{}/api/conversations/{}/messages",
            self.config.base_url, session_id
        );

        let response = self
            .client
            .post(&url)
            .json(&json!({ "content": message }))
            .send()
            .await
            .map_err(|e| WorkerError::PushMessage(Self::map_send_error(e)))?;
        Self::check_status(response)
            .await
            .map_err(WorkerError::PushMessage)?;

        debug!(session_id, "message pushed to worker session");
        Ok(())
    }

    async fn raw_call(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> super::Result<serde_json::Value> {
        let tag = |source: CallError| WorkerError::RawCall {
            method: method.to_string(),
            path: path.to_string(),
            source,
        };

        let http_method: reqwest::Method = method
            .parse()
            .map_err(|_| tag(CallError::Malformed(format!("unknown method {}", method))))?;

        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.client.request(http_method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| tag(Self::map_send_error(e)))?;
        let response = Self::check_status(response).await.map_err(&tag)?;

        if response.content_length() == Some(0) {
            return Ok(serde_json::Value::Null);
        }

        response
            .json()
            .await
            .map_err(|e| tag(CallError::Malformed(e.to_string())))
    }
}

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::AppError;

/// Downstream notification channel. Implementations deliver an opaque payload
/// and return a provider-assigned message id.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<String, AppError>;
}

/// Queue client that POSTs payloads to an HTTP push endpoint.
pub struct HttpQueueClient {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl HttpQueueClient {
    pub fn new(endpoint: &str) -> Result<Self, AppError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| AppError::InvalidArgument(format!("Invalid queue endpoint: {e}")))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }
}

#[async_trait]
impl MessageQueue for HttpQueueClient {
    async fn publish(&self, payload: Bytes) -> Result<String, AppError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json")
            .body(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Publish(format!(
                "Queue endpoint returned {}",
                response.status()
            )));
        }

        let message_id = response.text().await?;
        Ok(message_id.trim().to_string())
    }
}

/// In-memory queue for tests, recording every published payload.
#[cfg(any(test, feature = "test-utils"))]
pub struct MemoryQueue {
    messages: tokio::sync::Mutex<Vec<Bytes>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            messages: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn published(&self) -> Vec<Bytes> {
        self.messages.lock().await.clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, payload: Bytes) -> Result<String, AppError> {
        self.messages.lock().await.push(payload);
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_queue_records_payloads() {
        let queue = MemoryQueue::new();

        let id = queue
            .publish(Bytes::from_static(b"{\"outputFilename\":\"a.csv\"}"))
            .await
            .expect("publish");
        assert!(!id.is_empty());

        let published = queue.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].as_ref(), b"{\"outputFilename\":\"a.csv\"}");
    }

    #[test]
    fn test_http_queue_client_rejects_bad_endpoint() {
        let result = HttpQueueClient::new("not a url");
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
    }
}

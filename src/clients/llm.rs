use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Chat-completion backend used by `llm` nodes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        request: ChatRequest,
    ) -> Result<String>;

    /// Stream the answer in chunks. Defaults to a single chunk from [`LlmClient::chat`].
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let content = self.chat(request).await?;
        Ok(Box::pin(tokio_stream::once(Ok(content))))
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_stream::StreamExt;

use crate::{
    Result,
    clients::{ChatMessage, ChatRequest, LlmClient},
    common::Vars,
    model::NodeModel,
    runtime::Context,
    workflow::{consts::LLM_OUTPUT, template},
};

use super::{NodeExecutor, Outcome};

/// Sends the resolved prompts to the configured LLM client.
pub struct LlmExecutor {
    client: Option<Arc<dyn LlmClient>>,
}

impl LlmExecutor {
    pub fn new(client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            client,
        }
    }

    fn request(
        node: &NodeModel,
        model_id: String,
        vars: &Vars,
    ) -> ChatRequest {
        let mut messages = Vec::new();
        if let Some(system) = node.config_str(&["prompt", "systemPrompt"]).map(|s| template::resolve_template(vars, &s)).filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(&system));
        }
        if let Some(user) = node.config_str(&["userPrompt", "message"]).map(|s| template::resolve_template(vars, &s)).filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::user(&user));
        }
        ChatRequest {
            model_id,
            messages,
        }
    }
}

#[async_trait]
impl NodeExecutor for LlmExecutor {
    fn node_type(&self) -> &str {
        "llm"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "modelId": { "type": ["string", "integer"] },
                "llmId": { "type": ["string", "integer"] },
                "prompt": { "type": "string" },
                "systemPrompt": { "type": "string" },
                "userPrompt": { "type": "string" },
                "message": { "type": "string" },
                "outputVariable": { "type": "string" },
                "stream": { "type": "boolean" }
            }
        })
    }

    async fn execute(
        &self,
        ctx: Arc<Context>,
        node: &NodeModel,
    ) -> Result<Outcome> {
        let Some(model_id) = node.config_str(&["modelId", "llmId"]) else {
            return Ok(Outcome::Failed("llm node has no model configured".to_string()));
        };
        let Some(client) = &self.client else {
            return Ok(Outcome::Failed("no llm client configured".to_string()));
        };

        let request = Self::request(node, model_id, ctx.variables());
        let content = if node.config_bool("stream") {
            let mut stream = client.chat_stream(request).await?;
            let mut content = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                ctx.emit_log(&node.id, chunk.clone());
                content.push_str(&chunk);
            }
            content
        } else {
            client.chat(request).await?
        };

        let output = node.config_str(&["outputVariable"]).unwrap_or_else(|| LLM_OUTPUT.to_string());
        Ok(Outcome::Completed(Vars::new().with(&output, content)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream::{self, BoxStream};

    use super::*;

    #[derive(Default)]
    struct RecordingLlm {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LlmClient for RecordingLlm {
        async fn chat(
            &self,
            request: ChatRequest,
        ) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok("pong".to_string())
        }

        async fn chat_stream(
            &self,
            _: ChatRequest,
        ) -> Result<BoxStream<'static, Result<String>>> {
            Ok(Box::pin(stream::iter(vec![Ok("po".to_string()), Ok("ng".to_string())])))
        }
    }

    fn node(data: Value) -> NodeModel {
        serde_json::from_value(json!({"id": "llm", "type": "llm", "data": data})).unwrap()
    }

    #[tokio::test]
    async fn test_llm_builds_messages() {
        let client = Arc::new(RecordingLlm::default());
        let executor = LlmExecutor::new(Some(client.clone()));
        let ctx = Arc::new(Context::new("e1", Vars::new().with("q", "ping")));

        let outcome = executor.execute(ctx, &node(json!({"llmId": 3, "systemPrompt": "be brief", "message": "say ${q}", "outputVariable": "reply"}))).await.unwrap();
        assert_eq!(outcome, Outcome::Completed(Vars::new().with("reply", "pong")));

        let requests = client.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            ChatRequest {
                model_id: "3".to_string(),
                messages: vec![ChatMessage::system("be brief"), ChatMessage::user("say ping")],
            }
        );
    }

    #[tokio::test]
    async fn test_llm_stream_concatenates() {
        let executor = LlmExecutor::new(Some(Arc::new(RecordingLlm::default())));
        let ctx = Arc::new(Context::new("e1", Vars::new()));
        let outcome = executor.execute(ctx, &node(json!({"modelId": "m", "stream": true}))).await.unwrap();
        assert_eq!(outcome, Outcome::Completed(Vars::new().with(LLM_OUTPUT, "pong")));
    }

    #[tokio::test]
    async fn test_llm_requires_model_and_client() {
        let ctx = Arc::new(Context::new("e1", Vars::new()));
        let with_client = LlmExecutor::new(Some(Arc::new(RecordingLlm::default())));
        assert_eq!(with_client.execute(ctx.clone(), &node(json!({}))).await.unwrap(), Outcome::Failed("llm node has no model configured".to_string()));

        let without_client = LlmExecutor::new(None);
        assert_eq!(without_client.execute(ctx, &node(json!({"modelId": "m"}))).await.unwrap(), Outcome::Failed("no llm client configured".to_string()));
    }
}

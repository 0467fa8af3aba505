use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use certify_core::agent::{FunctionCall, ModelBackend, ModelTurn, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Calls a locally-hosted Ollama model via its native chat API.
///
/// For deployments where document content must not leave the machine.
/// Tool turns use Ollama's `tools` field; models without tool support simply
/// answer with text and no calls.
pub struct OllamaBackend {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    async fn chat(&self, prompt: &str, tools: &[ToolDeclaration]) -> Result<OllamaResponseMessage> {
        let request_body = OllamaChatRequest {
            model: self.model.clone(),
            messages: vec![OllamaMessage {
                role: "user".into(),
                content: prompt.to_string(),
            }],
            stream: false,
            tools: tools
                .iter()
                .map(|function| OllamaTool {
                    kind: "function",
                    function,
                })
                .collect(),
        };

        info!(
            model = %self.model,
            base_url = %self.base_url,
            tools = tools.len(),
            "calling ollama chat API"
        );

        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        let response = match client.post(&url).json(&request_body).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(model = %self.model, timeout_secs = self.timeout_secs, "ollama request timed out");
                bail!("Ollama request timed out after {}s", self.timeout_secs);
            },
            Err(e) => {
                warn!(model = %self.model, "ollama request failed: {}", e);
                return Err(e).context("Ollama request failed");
            },
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "ollama returned non-200: {}", body);
            bail!("Ollama error {}: {}", status, body);
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("failed to parse Ollama response")?;

        info!(
            model = %self.model,
            output_len = parsed.message.content.len(),
            tool_calls = parsed.message.tool_calls.len(),
            "ollama response received"
        );

        Ok(parsed.message)
    }
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OllamaTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDeclaration,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[derive(Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl From<OllamaResponseMessage> for ModelTurn {
    fn from(m: OllamaResponseMessage) -> Self {
        Self {
            text: m.content,
            function_calls: m
                .tool_calls
                .into_iter()
                .map(|c| FunctionCall::new(c.function.name, c.function.arguments))
                .collect(),
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(self.chat(prompt, &[]).await?.content)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn> {
        Ok(self.chat(prompt, tools).await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_calls_map_to_function_calls() {
        let response: OllamaChatResponse = serde_json::from_value(json!({
            "model": "llama3.1",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    { "function": { "name": "save_analysis_to_vault", "arguments": { "user_id": "u", "analysis_data": "{}" } } }
                ]
            },
            "done": true
        }))
        .unwrap();
        let turn: ModelTurn = response.message.into();
        assert_eq!(turn.function_calls.len(), 1);
        assert_eq!(turn.function_calls[0].name, "save_analysis_to_vault");
        assert_eq!(turn.function_calls[0].args["user_id"], "u");
    }

    #[test]
    fn plain_reply_has_no_calls() {
        let response: OllamaChatResponse = serde_json::from_value(json!({
            "message": { "role": "assistant", "content": "{\"summary\":\"s\"}" }
        }))
        .unwrap();
        let turn: ModelTurn = response.message.into();
        assert_eq!(turn.text, "{\"summary\":\"s\"}");
        assert!(turn.function_calls.is_empty());
    }

    #[test]
    fn tools_are_wrapped_as_functions() {
        let decls = certify_core::tools::declarations();
        let request = OllamaChatRequest {
            model: "llama3.1".into(),
            messages: Vec::new(),
            stream: false,
            tools: decls
                .iter()
                .map(|function| OllamaTool {
                    kind: "function",
                    function,
                })
                .collect(),
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["tools"][0]["type"], "function");
        assert_eq!(v["tools"][1]["function"]["name"], "schedule_follow_up_event");
        assert_eq!(v["stream"], false);
    }
}

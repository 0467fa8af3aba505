use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use certify_core::agent::{FunctionCall, ModelBackend, ModelTurn, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Calls a hosted Gemini model through the `generateContent` REST API.
///
/// Tool-enabled turns use Gemini's native function calling: declarations go
/// out in `tools[].functionDeclarations`, proposed calls come back as
/// `functionCall` parts in the first candidate.
pub struct GeminiBackend {
    pub base_url: String,
    pub model: String,
    api_key: String,
    pub timeout_secs: u64,
    http: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        Self::build(
            "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key.into(),
            model.into(),
            120,
        )
    }

    pub fn with_base_url(self, url: impl Into<String>) -> Result<Self> {
        Self::build(url.into(), self.api_key, self.model, self.timeout_secs)
    }

    pub fn with_timeout(self, secs: u64) -> Result<Self> {
        Self::build(self.base_url, self.api_key, self.model, secs)
    }

    fn build(base_url: String, api_key: String, model: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url,
            model,
            api_key,
            timeout_secs,
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    async fn call(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse> {
        let response = match self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                warn!(model = %self.model, timeout_secs = self.timeout_secs, "gemini request timed out");
                bail!("Gemini request timed out after {}s", self.timeout_secs);
            },
            Err(e) => return Err(e).context("Gemini request failed"),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, status = %status, "gemini returned non-200: {}", body);
            bail!("Gemini error {}: {}", status, body);
        }

        response
            .json()
            .await
            .context("failed to parse Gemini response")
    }
}

// ── Wire types ────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GeminiTool<'a>>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool<'a> {
    function_declarations: &'a [ToolDeclaration],
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn user_prompt(prompt: &str) -> Vec<Content> {
    vec![Content {
        role: "user".into(),
        parts: vec![Part {
            text: Some(prompt.to_string()),
            function_call: None,
        }],
    }]
}

/// Collapse the first candidate into text plus function calls, in part order.
fn into_turn(response: GenerateResponse) -> Result<ModelTurn> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".into());
        bail!("Gemini returned no candidates ({reason})");
    };

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    if parts.is_empty() {
        bail!(
            "Gemini returned an empty candidate (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }

    let mut turn = ModelTurn::default();
    for part in parts {
        if let Some(text) = part.text {
            turn.text.push_str(&text);
        }
        if let Some(call) = part.function_call {
            turn.function_calls.push(FunctionCall::new(call.name, call.args));
        }
    }
    Ok(turn)
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        info!(model = %self.model, prompt_len = prompt.len(), "calling gemini generateContent");
        let request = GenerateRequest {
            contents: user_prompt(prompt),
            tools: Vec::new(),
        };
        let turn = into_turn(self.call(&request).await?)?;
        info!(model = %self.model, output_len = turn.text.len(), "gemini response received");
        Ok(turn.text)
    }

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn> {
        info!(
            model = %self.model,
            prompt_len = prompt.len(),
            tools = tools.len(),
            "calling gemini generateContent with tools"
        );
        let request = GenerateRequest {
            contents: user_prompt(prompt),
            tools: vec![GeminiTool {
                function_declarations: tools,
            }],
        };
        let turn = into_turn(self.call(&request).await?)?;
        info!(
            model = %self.model,
            function_calls = turn.function_calls.len(),
            "gemini tool turn received"
        );
        Ok(turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: Value) -> Result<ModelTurn> {
        into_turn(serde_json::from_value(v).unwrap())
    }

    #[test]
    fn text_parts_are_concatenated() {
        let turn = parse(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "{\"summary\":" }, { "text": "\"x\"}" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();
        assert_eq!(turn.text, "{\"summary\":\"x\"}");
        assert!(turn.function_calls.is_empty());
    }

    #[test]
    fn function_calls_keep_model_order() {
        let turn = parse(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "functionCall": { "name": "schedule_follow_up_event", "args": { "date": "2026-01-01" } } },
                    { "functionCall": { "name": "save_analysis_to_vault", "args": { "user_id": "u" } } }
                ]}
            }]
        }))
        .unwrap();
        let names: Vec<&str> = turn.function_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, &["schedule_follow_up_event", "save_analysis_to_vault"]);
        assert_eq!(turn.function_calls[0].args["date"], "2026-01-01");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let err = parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } })).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_is_an_error() {
        let err = parse(json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] })).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn request_serializes_function_declarations() {
        let decls = certify_core::tools::declarations();
        let request = GenerateRequest {
            contents: user_prompt("hi"),
            tools: vec![GeminiTool {
                function_declarations: &decls,
            }],
        };
        let v = serde_json::to_value(&request).unwrap();
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(
            v["tools"][0]["functionDeclarations"][0]["name"],
            "save_analysis_to_vault"
        );
        assert!(v["contents"][0]["parts"][0].get("functionCall").is_none());
    }

    #[test]
    fn request_without_tools_omits_field() {
        let request = GenerateRequest {
            contents: user_prompt("hi"),
            tools: Vec::new(),
        };
        let v = serde_json::to_value(&request).unwrap();
        assert!(v.get("tools").is_none());
    }

    #[test]
    fn endpoint_joins_model_path() {
        let backend = GeminiBackend::new("k", "gemini-2.5-pro")
            .unwrap()
            .with_base_url("http://localhost:9000/v1beta/")
            .unwrap();
        assert_eq!(
            backend.endpoint(),
            "http://localhost:9000/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }
}

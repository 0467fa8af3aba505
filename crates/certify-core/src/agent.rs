use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A function call proposed by the model in a tool-enabled turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Reply to a tool-enabled generation: free text plus the calls in the order
/// the model listed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
}

/// A tool advertised to the model. `parameters` is a JSON-schema object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Model identifier, used in logs.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn generate_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDeclaration],
    ) -> Result<ModelTurn>;
}

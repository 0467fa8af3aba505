pub mod gemini;
pub mod instruction;
pub mod ollama;
pub mod orchestrator;
pub mod reply;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use orchestrator::{AgentError, Orchestrator};

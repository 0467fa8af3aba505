use std::collections::HashMap;

use anyhow::{bail, Result};

/// Application configuration, read from the environment with `.env` fallback.
#[derive(Debug, Clone)]
pub struct Config {
    /// "gemini" (default) or "ollama".
    pub backend: String,

    // Gemini
    pub gemini_api_key: String,
    pub model: String,
    pub model_base_url: String,

    // Ollama
    pub ollama_url: String,
    pub ollama_model: String,

    pub model_timeout_s: u64,

    // OCR
    pub vision_api_key: String,
    pub vision_base_url: String,

    // Storage
    pub data_dir: String,

    // Web
    pub web_bind: String,
    pub web_port: u16,
    pub max_upload_mb: usize,
    /// Vault owner for requests that don't name one.
    pub default_user_id: String,
}

fn parse_dotenv_str(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            let v = v.trim().trim_matches('"');
            map.insert(k.trim().to_string(), v.to_string());
        }
    }
    map
}

fn parse_dotenv() -> HashMap<String, String> {
    match std::fs::read_to_string(".env") {
        Ok(contents) => parse_dotenv_str(&contents),
        Err(_) => HashMap::new(),
    }
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_usize(key: &str, dotenv: &HashMap<String, String>, default: usize) -> usize {
    get(key, dotenv)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_dotenv(parse_dotenv())
    }

    fn from_dotenv(dotenv: HashMap<String, String>) -> Result<Self> {
        let backend = get_str("BACKEND", &dotenv, "gemini").to_lowercase();
        if !matches!(backend.as_str(), "gemini" | "ollama") {
            bail!("unsupported BACKEND {backend:?} (expected \"gemini\" or \"ollama\")");
        }

        let gemini_api_key = get_str("GEMINI_API_KEY", &dotenv, "");
        let vision_api_key = get("VISION_API_KEY", &dotenv)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| gemini_api_key.clone());

        Ok(Config {
            backend,
            gemini_api_key,
            model: get_str("MODEL", &dotenv, "gemini-2.5-pro"),
            model_base_url: get_str(
                "MODEL_BASE_URL",
                &dotenv,
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            ollama_url: get_str("OLLAMA_URL", &dotenv, "http://127.0.0.1:11434"),
            ollama_model: get_str("OLLAMA_MODEL", &dotenv, "llama3.1"),
            model_timeout_s: get_u64("MODEL_TIMEOUT_S", &dotenv, 120),
            vision_api_key,
            vision_base_url: get_str("VISION_BASE_URL", &dotenv, "https://vision.googleapis.com/v1"),
            data_dir: get_str("DATA_DIR", &dotenv, "store"),
            web_bind: get_str("WEB_BIND", &dotenv, "127.0.0.1"),
            web_port: get_u16("WEB_PORT", &dotenv, 5000),
            max_upload_mb: get_usize("MAX_UPLOAD_MB", &dotenv, 16),
            default_user_id: get_str("DEFAULT_USER_ID", &dotenv, "anonymous"),
        })
    }

    pub fn db_path(&self) -> String {
        format!("{}/certify.db", self.data_dir)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

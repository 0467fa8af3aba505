mod routes;

use certify_agent::{GeminiBackend, OllamaBackend, Orchestrator};
use certify_core::{
    agent::ModelBackend,
    config::Config,
    db::Db,
    tools::PlaceholderCalendar,
};
use certify_extract::{PdfExtractor, TextExtractor, VisionOcr};
use std::sync::Arc;
use tracing::info;

// ── AppState ──────────────────────────────────────────────────────────────

pub struct AppState {
    pub db: Arc<Db>,
    pub orchestrator: Orchestrator,
    pub pdf: Arc<dyn TextExtractor>,
    pub ocr: Arc<dyn TextExtractor>,
    pub default_user_id: String,
}

// ── main ──────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "certify_server=info,certify_agent=info,certify_extract=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let mut db = Db::open(&config.db_path())?;
    db.migrate()?;
    let db = Arc::new(db);

    // Select model backend based on BACKEND env var
    let backend: Arc<dyn ModelBackend> = match config.backend.as_str() {
        "ollama" => Arc::new(
            OllamaBackend::new(&config.ollama_url, &config.ollama_model)
                .with_timeout(config.model_timeout_s),
        ),
        _ => {
            if config.gemini_api_key.is_empty() {
                tracing::warn!("GEMINI_API_KEY is not set; model calls will be rejected");
            }
            Arc::new(
                GeminiBackend::new(&config.gemini_api_key, &config.model)?
                    .with_base_url(&config.model_base_url)?
                    .with_timeout(config.model_timeout_s)?,
            )
        },
    };
    info!(backend = %config.backend, model = %backend.model(), "model backend ready");

    let orchestrator = Orchestrator::new(
        backend,
        Arc::clone(&db) as Arc<dyn certify_core::tools::Vault>,
        Arc::new(PlaceholderCalendar),
    );

    let ocr = VisionOcr::new(&config.vision_api_key)
        .with_base_url(&config.vision_base_url)
        .with_timeout(config.model_timeout_s);

    let state = Arc::new(AppState {
        db,
        orchestrator,
        pdf: Arc::new(PdfExtractor),
        ocr: Arc::new(ocr),
        default_user_id: config.default_user_id.clone(),
    });

    let app = routes::router(state, config.max_upload_bytes());

    let bind = config.web_bind.clone();
    let port = config.web_port;
    let addr = format!("{bind}:{port}");

    info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

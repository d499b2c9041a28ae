use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crop_disease_service::{
    advice::AdviceFetcher,
    annotate::Annotator,
    build_router,
    classifier::Classifier,
    config::Config,
    gemini::GeminiClient,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("cannot create {}", config.upload_dir.display()))?;

    let classifier = load_classifier(&config).await?;

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set, advice lookups will fall back");
    }
    let gemini = GeminiClient::new(
        &config.gemini_endpoint,
        &config.gemini_model,
        config.gemini_api_key.clone(),
    );

    let annotator = Annotator::from_font_path(config.font_path.as_deref())
        .context("failed to load banner font")?;

    let state = AppState {
        classifier,
        advice: AdviceFetcher::new(Arc::new(gemini)),
        annotator,
        upload_dir: config.upload_dir.clone(),
        public_base_url: config.public_base_url.clone(),
    };
    let app = build_router(state, config.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!("Listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "tensorflow")]
async fn load_classifier(config: &Config) -> Result<Arc<dyn Classifier>> {
    crop_disease_service::utils::ensure_files_exist(config).await?;

    let model = crop_disease_service::model::Model::new(
        &config.model_path,
        &config.class_list_path,
        &config.model_input_op,
        &config.model_output_op,
        config.model_input_size,
    )
    .context("failed to load model")?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "tensorflow"))]
async fn load_classifier(_config: &Config) -> Result<Arc<dyn Classifier>> {
    anyhow::bail!("built without a classifier backend; enable the `tensorflow` feature")
}

//! Crop disease detection service.
//!
//! Accepts a leaf photo, classifies it, burns the predicted label into a copy
//! of the image and attaches treatment advice from a hosted language model.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};
use url::Url;

pub mod advice;
pub mod annotate;
pub mod classifier;
pub mod config;
pub mod error;
pub mod gemini;
#[cfg(feature = "tensorflow")]
pub mod model;
pub mod response;
pub mod routes;
pub mod utils;

use advice::AdviceFetcher;
use annotate::Annotator;
use classifier::Classifier;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub advice: AdviceFetcher,
    pub annotator: Annotator,
    pub upload_dir: PathBuf,
    /// When unset, URLs are built from the request's `Host` header.
    pub public_base_url: Option<Url>,
}

pub fn build_router(state: AppState, body_limit_bytes: usize) -> Router {
    let uploads = ServeDir::new(&state.upload_dir);

    Router::new()
        .route("/predict", post(routes::predict_handler))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .route("/health", get(routes::health_check))
        .nest_service(routes::UPLOAD_ROUTE, uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

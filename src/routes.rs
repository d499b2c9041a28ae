use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::{header::HOST, HeaderMap},
    Json,
};
use image::GenericImageView;
use tracing::{error, info, instrument, warn};
use url::Url;

use crate::annotate::banner_label;
use crate::classifier::ClassifierError;
use crate::error::ApiError;
use crate::response::{HealthResponse, PredictionResponse};
use crate::AppState;

pub const UPLOAD_ROUTE: &str = "/static/uploads";

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        service: "Crop Disease Detection API",
        model_loaded: state.classifier.is_loaded(),
    })
}

#[instrument(skip_all)]
pub async fn predict_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let upload = read_upload(multipart?).await?;

    let stored_name = format!("{}_{}", unix_seconds(), upload.file_name);
    let stored_path = state.upload_dir.join(&stored_name);
    tokio::fs::write(&stored_path, &upload.bytes).await?;
    info!(file = %stored_name, bytes = upload.bytes.len(), "stored upload");

    let classifier = state.classifier.clone();
    let (classification, dimensions) = tokio::task::spawn_blocking(move || {
        let image = image::load_from_memory(&upload.bytes)?;
        let classification = classifier.classify(&image)?;
        Ok::<_, ApiError>((classification, image.dimensions()))
    })
    .await
    .map_err(ClassifierError::from)??;
    info!(
        label = %classification.label,
        confidence = classification.confidence,
        "classified upload"
    );

    let annotated_name = format!("annotated_{}", stored_name);
    let annotated_path = state.upload_dir.join(&annotated_name);
    let annotator = state.annotator.clone();
    let label = banner_label(&classification.label, classification.confidence);
    // the URL below is returned whether or not annotation succeeded
    let annotation = tokio::task::spawn_blocking(move || {
        annotator.annotate(&stored_path, &label, &annotated_path)
    });
    match annotation.await {
        Ok(true) => {}
        Ok(false) => warn!(file = %annotated_name, "serving URL for unannotated image"),
        Err(err) => error!(file = %annotated_name, error = %err, "annotation task panicked"),
    }

    let advice = state.advice.fetch(&classification.label).await;

    let base = public_base(state.public_base_url.as_ref(), &headers)?;
    let annotated_url = public_url(&base, &annotated_name)?;

    Ok(Json(PredictionResponse::assemble(
        classification,
        advice,
        dimensions,
        annotated_url.to_string(),
    )))
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or(ApiError::EmptyFilename)?;
        let bytes = field.bytes().await?.to_vec();
        return Ok(Upload { file_name, bytes });
    }
    Err(ApiError::MissingFile)
}

/// Keeps only the last path component of a client-supplied name.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let name = Path::new(&normalized).file_name()?.to_str()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn public_base(configured: Option<&Url>, headers: &HeaderMap) -> Result<Url, ApiError> {
    if let Some(url) = configured {
        return Ok(url.clone());
    }
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    Url::parse(&format!("http://{}/", host)).map_err(|e| ApiError::Url(e.to_string()))
}

fn public_url(base: &Url, file_name: &str) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ApiError::Url(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .extend(UPLOAD_ROUTE.trim_start_matches('/').split('/'))
        .push(file_name);
    Ok(url)
}

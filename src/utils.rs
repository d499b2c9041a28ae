use std::path::Path;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use tracing::info;

use crate::config::Config;

async fn download_file(url: &str, path: &Path, token: Option<&str>) -> Result<()> {
    info!(url, path = %path.display(), "downloading model artifact");

    let mut header_map = HeaderMap::new();
    if let Some(token) = token {
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("GITHUB_TOKEN is not a valid header value")?;
        header_map.insert(AUTHORIZATION, auth_value);
    }
    header_map.insert(ACCEPT, HeaderValue::from_static("application/octet-stream"));

    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .headers(header_map)
        .send()
        .await
        .with_context(|| format!("failed to request {}", url))?;

    if !response.status().is_success() {
        bail!("failed to download {}: {}", url, response.status());
    }

    let bytes = response.bytes().await.context("failed to read download body")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

async fn ensure_file(path: &Path, url: Option<&str>, url_var: &str, token: Option<&str>) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    match url {
        Some(url) => download_file(url, path, token).await,
        None => bail!("{} is missing and {} is not set", path.display(), url_var),
    }
}

/// Makes sure the classifier graph and class list are on disk, fetching them if needed.
pub async fn ensure_files_exist(config: &Config) -> Result<()> {
    info!("checking model artifacts");
    let token = config.github_token.as_deref();
    ensure_file(&config.model_path, config.model_url.as_deref(), "MODEL_URL", token).await?;
    ensure_file(
        &config.class_list_path,
        config.class_list_url.as_deref(),
        "CLASS_LIST_URL",
        token,
    )
    .await
}

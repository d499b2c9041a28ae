//! Treatment advice for a classified disease.
//!
//! Healthy labels are answered locally. Everything else goes to the hosted
//! language model, whose reply must be a JSON object with exactly
//! `severity`, `description` and `recommendations`. Any failure on that path
//! degrades to a fixed fallback payload instead of failing the request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::gemini::GenerativeModel;

#[derive(Debug, Error)]
pub enum AdviceError {
    #[error("advice API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("advice API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("advice API reply carried no text")]
    MissingText,
    #[error("advice reply is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("advice reply violates schema: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Advice {
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
}

impl Advice {
    fn new(severity: Severity, description: &str, recommendations: &[&str]) -> Self {
        Self {
            severity,
            description: description.to_string(),
            recommendations: recommendations.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn healthy() -> Self {
        Self::new(
            Severity::Low,
            "The crop appears healthy and vigorous.",
            &["Continue regular monitoring.", "Maintain current irrigation."],
        )
    }

    /// Used when the API answered with a non-success status.
    pub fn api_unavailable() -> Self {
        Self::new(Severity::Unknown, "API Limit or Error", &["Check API Key"])
    }

    /// Used for every other failure: transport, empty reply, unparseable reply.
    pub fn unavailable() -> Self {
        Self::new(
            Severity::Unknown,
            "Could not retrieve details.",
            &["Consult a local agronomist."],
        )
    }
}

pub fn is_healthy(label: &str) -> bool {
    label.to_lowercase().contains("healthy")
}

pub fn build_prompt(disease: &str) -> String {
    format!(
        "You are an expert plant pathologist.\n\
         The detected crop disease is \"{disease}\".\n\
         \n\
         Return a valid JSON object with exactly these fields:\n\
         - severity: \"low\", \"medium\", or \"high\"\n\
         - description: A short 1-sentence explanation of the disease.\n\
         - recommendations: A list of 3 actionable steps to treat it.\n\
         \n\
         Do not use markdown formatting. Just return the raw JSON."
    )
}

/// Drops one surrounding markdown code fence, with or without a `json` tag.
fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = match rest.get(..4) {
            Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
            _ => rest,
        };
        text = text.strip_suffix("```").unwrap_or(text);
    }
    text.trim()
}

/// Parses the model's text reply into `Advice`. Extra fields, missing fields
/// and a severity outside low/medium/high are all rejected.
pub fn parse_advice(raw: &str) -> Result<Advice, AdviceError> {
    let advice: Advice = serde_json::from_str(strip_code_fence(raw))?;
    if advice.severity == Severity::Unknown {
        return Err(AdviceError::Schema(
            "severity must be low, medium or high".into(),
        ));
    }
    Ok(advice)
}

#[derive(Clone)]
pub struct AdviceFetcher {
    model: Arc<dyn GenerativeModel>,
}

impl AdviceFetcher {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    /// Never fails; see the fallback constructors on `Advice`.
    pub async fn fetch(&self, disease: &str) -> Advice {
        if is_healthy(disease) {
            return Advice::healthy();
        }

        let reply = self.model.generate(&build_prompt(disease)).await;
        match reply.and_then(|text| parse_advice(&text)) {
            Ok(advice) => advice,
            Err(AdviceError::Status { status, body }) => {
                warn!(status, body = %body, "advice API error");
                Advice::api_unavailable()
            }
            Err(err) => {
                error!(disease, error = %err, "advice lookup failed");
                Advice::unavailable()
            }
        }
    }
}

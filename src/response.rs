use serde::Serialize;

use crate::advice::{Advice, Severity};
use crate::classifier::Classification;

#[derive(Debug, Serialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
    pub bbox: [u32; 4],
}

/// Body of a successful `POST /predict`.
#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub success: bool,
    pub disease_name: String,
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
    pub total_detections: usize,
    pub detections: Vec<Detection>,
    pub annotated_url: String,
}

impl PredictionResponse {
    /// Whole-image classification reported as a single detection spanning the image.
    pub fn assemble(
        classification: Classification,
        advice: Advice,
        (width, height): (u32, u32),
        annotated_url: String,
    ) -> Self {
        let confidence = round2(classification.confidence);
        let detections = vec![Detection {
            class_name: classification.label.clone(),
            confidence,
            bbox: [0, 0, width, height],
        }];

        Self {
            success: true,
            disease_name: classification.label,
            confidence,
            severity: advice.severity,
            description: advice.description,
            recommendations: advice.recommendations,
            total_detections: detections.len(),
            detections,
            annotated_url,
        }
    }
}

fn round2(value: f32) -> f64 {
    (value as f64 * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub model_loaded: bool,
}

use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("model backend error: {0}")]
    Backend(String),
    #[error("operation '{0}' not found in graph")]
    MissingOperation(String),
    #[error("model produced no scores")]
    EmptyOutput,
    #[error("classifier lock poisoned")]
    Poisoned,
    #[error("classification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Top-1 result of whole-image classification.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    /// Confidence is clamped into [0, 1]; NaN becomes 0.
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Image in, single best label out. Implementations may block.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<Classification, ClassifierError>;

    fn is_loaded(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(Classification::new("a", 1.7).confidence, 1.0);
        assert_eq!(Classification::new("a", -0.2).confidence, 0.0);
        assert_eq!(Classification::new("a", f32::NAN).confidence, 0.0);
        assert_eq!(Classification::new("a", 0.42).confidence, 0.42);
    }
}

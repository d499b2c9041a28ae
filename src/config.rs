use std::{env, path::PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub body_limit_bytes: usize,
    pub upload_dir: PathBuf,
    pub public_base_url: Option<Url>,
    pub model_path: PathBuf,
    pub class_list_path: PathBuf,
    pub model_url: Option<String>,
    pub class_list_url: Option<String>,
    pub github_token: Option<String>,
    pub model_input_op: String,
    pub model_output_op: String,
    pub model_input_size: u32,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    /// Unset means the bundled DejaVu Sans.
    pub font_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let text = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        let body_limit_mb: usize = parse(&var, "BODY_LIMIT_MB", "a whole number of megabytes", 10)?;

        let public_base_url = match var("PUBLIC_BASE_URL") {
            Some(raw) => Some(Url::parse(&raw).map_err(|_| ConfigError::Invalid {
                name: "PUBLIC_BASE_URL",
                expected: "an absolute URL",
                value: raw,
            })?),
            None => None,
        };

        let model_input_size = parse(&var, "MODEL_INPUT_SIZE", "a positive pixel count", 224)?;
        if model_input_size == 0 {
            return Err(ConfigError::Invalid {
                name: "MODEL_INPUT_SIZE",
                expected: "a positive pixel count",
                value: "0".into(),
            });
        }

        Ok(Config {
            port: parse(&var, "PORT", "a port number between 0 and 65535", 5000)?,
            body_limit_bytes: body_limit_mb * 1024 * 1024,
            upload_dir: text("UPLOAD_DIR", "static/uploads").into(),
            public_base_url,
            model_path: text("MODEL_PATH", "./model/frozen_graph.pb").into(),
            class_list_path: text("CLASS_LIST_PATH", "./model/class_list.txt").into(),
            model_url: var("MODEL_URL"),
            class_list_url: var("CLASS_LIST_URL"),
            github_token: var("GITHUB_TOKEN"),
            model_input_op: text("MODEL_INPUT_OP", "x"),
            model_output_op: text("MODEL_OUTPUT_OP", "Identity"),
            model_input_size,
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: text("GEMINI_MODEL", "gemini-2.5-flash"),
            gemini_endpoint: text(
                "GEMINI_ENDPOINT",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            font_path: var("FONT_PATH").map(PathBuf::from),
        })
    }
}

fn parse<T, V>(var: &V, name: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            expected,
            value: raw,
        }),
        None => Ok(default),
    }
}

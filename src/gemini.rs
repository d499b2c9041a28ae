use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::advice::AdviceError;

/// Text-in, text-out access to a hosted language model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Returns the model's text reply. A non-success HTTP status is `AdviceError::Status`.
    async fn generate(&self, prompt: &str) -> Result<String, AdviceError>;
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: Option<String>) -> Self {
        Self {
            // no timeout: a stalled upstream holds the request open
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.unwrap_or_default(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, AdviceError> {
        let payload = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        debug!(model = %self.model, "requesting advice");

        let response = self
            .client
            .post(self.url())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdviceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: GenerateContentResponse = response.json().await?;
        data.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or(AdviceError::MissingText)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, AdviceFetcher};
    use axum::{
        extract::Query,
        http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1beta", addr)
    }

    #[tokio::test]
    async fn returns_first_candidate_text() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(
                |axum::extract::Path(call): axum::extract::Path<String>,
                 Query(query): Query<HashMap<String, String>>,
                 headers: HeaderMap,
                 Json(body): Json<Value>| async move {
                    assert_eq!(headers[CONTENT_TYPE], "application/json");
                    assert_eq!(call, "gemini-test:generateContent");
                    assert_eq!(query.get("key").map(String::as_str), Some("k-123"));
                    let prompt = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
                    assert!(prompt.contains("Leaf Rust"));
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": "hello"}]}}]
                    }))
                },
            ),
        );
        let endpoint = serve(app).await;
        let client = GeminiClient::new(&endpoint, "gemini-test", Some("k-123".into()));

        let text = client.generate("about Leaf Rust").await.unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "quota exhausted").into_response() }),
        );
        let endpoint = serve(app).await;
        let client = GeminiClient::new(&endpoint, "gemini-test", None);

        match client.generate("anything").await {
            Err(AdviceError::Status { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exhausted");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_candidates_are_missing_text() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(|| async { Json(json!({ "candidates": [] })) }),
        );
        let endpoint = serve(app).await;
        let client = GeminiClient::new(&endpoint, "gemini-test", None);

        assert!(matches!(
            client.generate("anything").await,
            Err(AdviceError::MissingText)
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_falls_back() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = GeminiClient::new(&format!("http://{}/v1beta", addr), "gemini-test", None);

        assert!(matches!(
            client.generate("anything").await,
            Err(AdviceError::Transport(_))
        ));

        let fetcher = AdviceFetcher::new(Arc::new(client));
        assert_eq!(fetcher.fetch("Apple Scab").await, Advice::unavailable());
    }

    #[tokio::test]
    async fn non_json_success_body_falls_back() {
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(|| async { "<html><body>maintenance</body></html>" }),
        );
        let endpoint = serve(app).await;
        let fetcher = AdviceFetcher::new(Arc::new(GeminiClient::new(&endpoint, "gemini-test", None)));

        assert_eq!(fetcher.fetch("Apple Scab").await, Advice::unavailable());
    }
}

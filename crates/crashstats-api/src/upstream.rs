//! HTTP client for the crash-store middleware service.
//!
//! `GET <base>/<endpoint>/?k=v&k=v2` for queries, form `POST` for actions.
use async_trait::async_trait;
use crashstats_core::{BackendError, BackendParams, BackendResult, ModelBackend, ModelDescriptor};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| BackendError::Unavailable(format!("{base_url}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint_url(&self, model: &ModelDescriptor) -> Result<Url, BackendError> {
        let endpoint = model.backend_endpoint.trim_matches('/');
        self.base_url
            .join(&format!("{endpoint}/"))
            .map_err(|e| BackendError::Unavailable(format!("{endpoint}: {e}")))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::BAD_REQUEST {
            Err(BackendError::bad_argument(message))
        } else {
            Err(BackendError::Upstream {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Flatten params into repeated pairs; lists become one pair per element
pub fn query_pairs(params: &BackendParams) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        pairs.push((name.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    pairs.push((name.clone(), text));
                }
            }
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse_json(bytes: &[u8]) -> Result<Value, BackendError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| BackendError::Payload(e.to_string()))
}

#[async_trait]
impl ModelBackend for HttpBackend {
    async fn get(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<BackendResult, BackendError> {
        let url = self.endpoint_url(model)?;
        debug!(model = %model.name, url = %url, "Backend query");
        let response = self.send(self.client.get(url).query(&query_pairs(params))).await?;

        let binary = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/octet-stream"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Payload(e.to_string()))?;

        if binary {
            Ok(BackendResult::Binary(bytes.to_vec()))
        } else {
            parse_json(&bytes).map(BackendResult::Json)
        }
    }

    async fn act(
        &self,
        model: &ModelDescriptor,
        params: &BackendParams,
    ) -> Result<Value, BackendError> {
        let url = self.endpoint_url(model)?;
        debug!(model = %model.name, url = %url, "Backend action");
        let response = self.send(self.client.post(url).form(&query_pairs(params))).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::Payload(e.to_string()))?;
        parse_json(&bytes)
    }
}

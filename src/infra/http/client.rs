use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::usecase::ports::transport::{BatchPayload, Category, ImportTransport, TransportError};

/// `ImportTransport` over the backend's REST API.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get_body(&self, path: &str) -> Result<String, TransportError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(network_error)?;
        read_success(response)
    }

    fn post(&self, url: String, payload: &BatchPayload<'_>) -> Result<String, TransportError> {
        tracing::debug!(%url, rows = payload.rows.len(), "POST");
        let response = self
            .client
            .post(&url)
            .json(&payload.to_json())
            .send()
            .map_err(network_error)?;
        read_success(response)
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Network(format!("request timed out: {err}"))
    } else {
        TransportError::Network(err.to_string())
    }
}

fn read_success(response: Response) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().map_err(network_error)?;
    if !status.is_success() {
        tracing::warn!(status = status.as_u16(), "backend rejected request");
        return Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        });
    }
    Ok(body)
}

/// The `message` or `error` field of an error body, or the body itself when
/// it is short plain text.
pub fn error_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => ["message", "error"]
            .iter()
            .find_map(|key| value.get(key).and_then(Value::as_str))
            .map(str::to_string),
        Err(_) => {
            let text = body.trim();
            (!text.is_empty() && text.len() <= 200).then(|| text.to_string())
        }
    }
}

/// Success message of a batch response, if the backend sent one.
pub fn success_message(body: &str) -> Option<String> {
    serde_json::from_str::<Value>(body)
        .ok()?
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Wrapped { data } => data,
            Listing::Bare(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct RawCategory {
    id: Value,
    name: String,
}

/// Accepts `{ "data": [...] }` or a bare list; ids may be numbers or strings.
pub fn parse_categories(body: &str) -> Result<Vec<Category>, TransportError> {
    let listing: Listing<RawCategory> =
        serde_json::from_str(body).map_err(|err| TransportError::Decode(err.to_string()))?;
    Ok(listing
        .into_vec()
        .into_iter()
        .map(|raw| Category {
            id: match raw.id {
                Value::String(id) => id,
                other => other.to_string(),
            },
            name: raw.name,
        })
        .collect())
}

/// Template labels, in order. Blank labels are dropped.
pub fn parse_template(body: &str) -> Result<Vec<String>, TransportError> {
    let listing: Listing<String> =
        serde_json::from_str(body).map_err(|err| TransportError::Decode(err.to_string()))?;
    Ok(listing
        .into_vec()
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect())
}

impl ImportTransport for HttpTransport {
    fn fetch_categories(&self, path: &str) -> Result<Vec<Category>, TransportError> {
        parse_categories(&self.get_body(path)?)
    }

    fn fetch_template(&self, path: &str) -> Result<Vec<String>, TransportError> {
        parse_template(&self.get_body(path)?)
    }

    fn post_batch(&self, payload: &BatchPayload<'_>) -> Result<Option<String>, TransportError> {
        let body = self.post(self.url(payload.endpoint), payload)?;
        Ok(success_message(&body))
    }

    fn dry_run_batch(&self, payload: &BatchPayload<'_>) -> Result<(), TransportError> {
        let url = format!("{}?dry_run=true", self.url(payload.endpoint));
        self.post(url, payload).map(|_| ())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entities::row::ImportRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// One batch as it goes over the wire: `{ "<payload_key>": [row, ...] }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPayload<'a> {
    pub endpoint: &'a str,
    pub payload_key: &'a str,
    pub rows: Vec<&'a ImportRow>,
}

impl BatchPayload<'_> {
    pub fn to_json(&self) -> Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                Value::Object(
                    row.iter()
                        .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                        .collect(),
                )
            })
            .collect();
        let mut body = Map::new();
        body.insert(self.payload_key.to_string(), Value::Array(rows));
        Value::Object(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

/// The import backend, consumed over request/response.
pub trait ImportTransport: Send + Sync {
    fn fetch_categories(&self, path: &str) -> Result<Vec<Category>, TransportError>;

    /// Ordered dynamic-column labels a collection expects.
    fn fetch_template(&self, path: &str) -> Result<Vec<String>, TransportError>;

    /// Commits one batch. Returns the server's message, if any.
    fn post_batch(&self, payload: &BatchPayload<'_>) -> Result<Option<String>, TransportError>;

    /// Asks the server to check a batch without committing it.
    fn dry_run_batch(&self, payload: &BatchPayload<'_>) -> Result<(), TransportError>;
}

use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::from_str;
use std::time::Duration;
use tracing::debug;

use crate::error::{RagError, Result};

/// Single POST with bearer auth. Any transport failure, non-2xx status or
/// undecodable body is an upstream error; nothing is retried.
pub fn post_json<T: DeserializeOwned, B: Serialize>(
    url: &str,
    api_key: &str,
    timeout_secs: u64,
    body: &B,
) -> Result<T> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| RagError::Upstream(e.to_string()))?;
    let resp = client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {}", api_key.trim()))
        .json(body)
        .send()
        .map_err(|e| RagError::Upstream(format!("POST {} failed: {}", url, e)))?;
    let status = resp.status();
    let text = resp.text().unwrap_or_default();
    debug!(url, %status, bytes = text.len(), "upstream responded");
    if !status.is_success() {
        return Err(RagError::Upstream(format!("POST {} failed: {} {}", url, status, text)));
    }
    from_str::<T>(&text)
        .map_err(|e| RagError::Upstream(format!("POST {} decode failed: {} | {}", url, e, text)))
}

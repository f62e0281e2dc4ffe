use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::post_json;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

pub fn embed_query(cfg: &Config, text: &str) -> Result<Vec<f32>> {
    let req = EmbedRequest {
        model: &cfg.embed_model,
        input: text,
    };
    let res = post_json::<EmbedResponse, _>(
        &cfg.embed_url,
        &cfg.together_api_key,
        cfg.http_timeout_secs,
        &req,
    )?;
    let embedding = res
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| RagError::Upstream("No embeddings in response".to_string()))?;
    if embedding.is_empty() {
        return Err(RagError::Upstream("Embedding is empty".to_string()));
    }
    Ok(embedding)
}

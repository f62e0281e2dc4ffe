use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::build_prompt::Message;
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::http::post_json;
use crate::retrieve_chunks::Hit;

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^```json|```$").expect("fence pattern is valid"));

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub links: Vec<Link>,
}

pub fn generate_answer(cfg: &Config, messages: &[Message]) -> Result<Answer> {
    let raw = generate_chat(cfg, messages)?;
    parse_answer(&raw)
}

fn generate_chat(cfg: &Config, messages: &[Message]) -> Result<String> {
    let req = ChatRequest {
        model: &cfg.chat_model,
        messages,
    };
    let res = post_json::<ChatResponse, _>(
        &cfg.chat_url,
        &cfg.aiproxy_api_key,
        cfg.http_timeout_secs,
        &req,
    )?;
    res.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| RagError::Upstream("No message content in completion".to_string()))
}

/// Removes a leading "```json" and any line-final "```" fence, then trims.
pub fn strip_json_fence(raw: &str) -> String {
    JSON_FENCE.replace_all(raw.trim(), "").trim().to_string()
}

pub fn parse_answer(raw: &str) -> Result<Answer> {
    let clean = strip_json_fence(raw);
    serde_json::from_str::<Answer>(&clean)
        .map_err(|e| RagError::Parse(format!("model reply is not a valid answer: {} | {}", e, clean)))
}

/// Drops links whose URL was not part of the retrieved context.
pub fn retain_known_links<'a>(answer: &mut Answer, hits: impl IntoIterator<Item = &'a Hit>) {
    let known: HashSet<&str> = hits.into_iter().map(Hit::url).collect();
    let before = answer.links.len();
    answer.links.retain(|link| {
        let keep = known.contains(link.url.as_str());
        if !keep {
            warn!(url = %link.url, "dropping link not present in retrieved context");
        }
        keep
    });
    debug!(kept = answer.links.len(), dropped = before - answer.links.len(), "links checked");
}

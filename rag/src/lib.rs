mod build_prompt;
mod config;
mod embed_query;
mod error;
mod extract_image_text;
mod generate;
mod http;
mod load_index;
mod retrieve_chunks;

pub use build_prompt::{build_messages, build_prompt, format_context_from_hits, Message};
pub use config::{Config, IndexLifetime};
pub use embed_query::embed_query;
pub use error::{RagError, Result};
pub use extract_image_text::{
    decode_image_payload, extract_text_from_base64, strip_data_uri, ImageText,
};
pub use generate::{
    generate_answer, parse_answer, retain_known_links, strip_json_fence, Answer, Link,
};
pub use load_index::{
    load_metadata, Corpora, Corpus, CorpusStore, Entry, EntryMetadata, FlatIndex, Neighbor,
};
pub use retrieve_chunks::{retrieve_top, similarity_from_distance, Hit};

use tracing::debug;

/// Runs the whole pipeline for one question: embed, retrieve from both
/// corpora, read any image, prompt the model and keep only grounded links.
pub fn answer_question(
    cfg: &Config,
    corpora: &Corpora,
    question: &str,
    image: Option<&str>,
) -> Result<Answer> {
    let query_vec = embed_query(cfg, question)?;
    debug!(dim = query_vec.len(), "embedded question");

    let discourse_hits = retrieve_top(&corpora.discourse, &query_vec, cfg.top_k)?;
    let course_hits = retrieve_top(&corpora.course, &query_vec, cfg.top_k)?;
    let discourse_context = format_context_from_hits(&discourse_hits);
    let course_context = format_context_from_hits(&course_hits);

    let image_text = match image.filter(|payload| !payload.is_empty()) {
        Some(payload) => Some(extract_text_from_base64(cfg, payload)?),
        None => None,
    };

    let prompt = build_prompt(question, &discourse_context, &course_context, image_text.as_ref());
    let messages = build_messages(cfg, prompt);
    let mut answer = generate_answer(cfg, &messages)?;
    retain_known_links(&mut answer, discourse_hits.iter().chain(&course_hits));
    Ok(answer)
}

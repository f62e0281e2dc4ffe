use serde::Serialize;
use tracing::debug;

use crate::error::{RagError, Result};
use crate::load_index::{Corpus, Entry};

/// A retrieved metadata entry decorated with its similarity to the query.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Hit {
    #[serde(flatten)]
    pub entry: Entry,
    pub similarity: f32,
}

impl Hit {
    pub fn text(&self) -> &str {
        &self.entry.text
    }

    pub fn url(&self) -> &str {
        &self.entry.metadata.url
    }
}

/// Maps a non-negative distance into (0, 1], 1.0 at distance zero.
pub fn similarity_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// The `k` entries of `corpus` closest to `query`, most similar first.
pub fn retrieve_top(corpus: &Corpus, query: &[f32], k: usize) -> Result<Vec<Hit>> {
    let neighbors = corpus.index().search(query, k)?;
    let mut hits = Vec::with_capacity(neighbors.len());
    for n in neighbors {
        let entry = corpus.entry(n.row).ok_or_else(|| {
            RagError::Resource(format!(
                "{} index returned row {} but metadata has {} entries",
                corpus.name(),
                n.row,
                corpus.len()
            ))
        })?;
        let mut entry = entry.clone();
        // `similarity` is written by the hit itself.
        entry.extra.remove("similarity");
        hits.push(Hit {
            entry,
            similarity: similarity_from_distance(n.distance),
        });
    }
    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    debug!(
        corpus = corpus.name(),
        hits = hits.len(),
        best = hits.first().map(|h| h.similarity),
        "retrieved"
    );
    Ok(hits)
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Failures of the answer pipeline, one variant per failure class.
///
/// Every variant reaches the HTTP boundary as the same 500 response; the
/// variant only matters for logs and tests.
#[derive(Error, Debug)]
pub enum RagError {
    /// Embedding or chat service unreachable, non-2xx, or returned an unexpected payload.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Index or metadata files missing, corrupt, or inconsistent.
    #[error("resource error: {0}")]
    Resource(String),

    /// Model reply was not the expected JSON object.
    #[error("parse error: {0}")]
    Parse(String),

    /// Image payload could not be decoded or read.
    #[error("image error: {0}")]
    Image(String),
}

impl RagError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream",
            Self::Resource(_) => "resource",
            Self::Parse(_) => "parse",
            Self::Image(_) => "image",
        }
    }
}

use std::env;
use std::path::PathBuf;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an assistant answering based only on the provided context. Do not search anything else!";

/// Whether the two corpora are read once at startup or again for every question.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexLifetime {
    Startup,
    PerRequest,
}

impl IndexLifetime {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "startup" | "once" => Some(Self::Startup),
            "per-request" | "per_request" | "request" => Some(Self::PerRequest),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub embed_url: String,
    pub embed_model: String,
    pub together_api_key: String,
    pub chat_url: String,
    pub chat_model: String,
    pub aiproxy_api_key: String,
    pub system_prompt: String,
    pub top_k: usize,
    pub index_lifetime: IndexLifetime,
    pub tesseract_cmd: String,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            embed_url: "https://api.together.xyz/v1/embeddings".to_string(),
            embed_model: "intfloat/multilingual-e5-large-instruct".to_string(),
            together_api_key: String::new(),
            chat_url: "https://aiproxy.sanand.workers.dev/openai/v1/chat/completions".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            aiproxy_api_key: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            top_k: 2,
            index_lifetime: IndexLifetime::Startup,
            tesseract_cmd: "tesseract".to_string(),
            http_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        // Load .env if present so API keys work without exporting them by hand.
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        Self {
            data_dir: env::var("RAG_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            embed_url: env::var("TOGETHER_EMBED_URL").unwrap_or(defaults.embed_url),
            embed_model: env::var("TOGETHER_EMBED_MODEL").unwrap_or(defaults.embed_model),
            together_api_key: env::var("TOGETHER_AI_API_KEY").unwrap_or_default(),
            chat_url: env::var("AIPROXY_CHAT_URL").unwrap_or(defaults.chat_url),
            chat_model: env::var("AIPROXY_CHAT_MODEL").unwrap_or(defaults.chat_model),
            aiproxy_api_key: env::var("AIPROXY_API_KEY").unwrap_or_default(),
            system_prompt: env::var("RAG_SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            top_k: env::var("RAG_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.top_k),
            index_lifetime: env::var("RAG_INDEX_LIFETIME")
                .ok()
                .and_then(|v| IndexLifetime::parse(&v))
                .unwrap_or(defaults.index_lifetime),
            tesseract_cmd: env::var("TESSERACT_CMD").unwrap_or(defaults.tesseract_cmd),
            http_timeout_secs: env::var("RAG_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
        }
    }

    pub fn discourse_index_path(&self) -> PathBuf {
        self.data_dir.join("discourse_index.faiss")
    }

    pub fn discourse_metadata_path(&self) -> PathBuf {
        self.data_dir.join("discourse_metadata.json")
    }

    pub fn course_index_path(&self) -> PathBuf {
        self.data_dir.join("course_index.faiss")
    }

    pub fn course_metadata_path(&self) -> PathBuf {
        self.data_dir.join("course_metadata.json")
    }

    /// Names of required API keys that are empty.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.together_api_key.trim().is_empty() {
            missing.push("TOGETHER_AI_API_KEY");
        }
        if self.aiproxy_api_key.trim().is_empty() {
            missing.push("AIPROXY_API_KEY");
        }
        missing
    }
}

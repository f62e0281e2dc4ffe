mod server;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Parser, Subcommand};
use rag::{Config, CorpusStore};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tds-assistant",
    about = "Answers course questions from forum posts and course material"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /generate-answer over HTTP.
    Serve {
        /// Address to bind the HTTP server to (host:port).
        #[arg(long, env = "RAG_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
    },
    /// Answer a single question and print the JSON answer.
    Ask {
        question: String,
        /// Image file whose text should be read into the prompt.
        #[arg(long)]
        image: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Reads .env first so clap's env fallbacks see it too.
    let cfg = Config::from_env();
    let cli = Cli::parse();
    for key in cfg.missing_keys() {
        warn!(key, "API key is not set, upstream calls will be rejected");
    }

    match cli.command {
        Command::Serve { bind } => serve(cfg, &bind).await,
        Command::Ask { question, image } => ask(cfg, question, image).await,
    }
}

async fn serve(cfg: Config, bind: &str) -> Result<()> {
    let store = CorpusStore::open(&cfg).context("failed to load corpora")?;
    info!(lifetime = ?cfg.index_lifetime, top_k = cfg.top_k, "corpora ready");
    let app = server::router(server::AppState::new(cfg, store));

    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "tds-assistant listening");
    axum::serve(listener, app).await.context("server shutdown")?;
    Ok(())
}

async fn ask(cfg: Config, question: String, image: Option<PathBuf>) -> Result<()> {
    let image = match image {
        Some(path) => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            Some(STANDARD.encode(bytes))
        }
        None => None,
    };
    let answer = tokio::task::spawn_blocking(move || -> rag::Result<rag::Answer> {
        let corpora = CorpusStore::open(&cfg)?.corpora(&cfg)?;
        rag::answer_question(&cfg, &corpora, &question, image.as_deref())
    })
    .await
    .context("answer task failed")??;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}

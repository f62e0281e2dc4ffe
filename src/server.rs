use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rag::{Answer, Config, CorpusStore};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

const FALLBACK_DETAIL: &str = "Unknown server error";

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<Config>,
    store: CorpusStore,
}

impl AppState {
    pub fn new(cfg: Config, store: CorpusStore) -> Self {
        Self { cfg: Arc::new(cfg), store }
    }
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    question: String,
    #[serde(default)]
    image: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/generate-answer", post(generate_answer))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn generate_answer(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Answer>, (StatusCode, Json<ErrorBody>)> {
    let AppState { cfg, store } = state;
    let outcome = tokio::task::spawn_blocking(move || -> rag::Result<Answer> {
        let corpora = store.corpora(&cfg)?;
        rag::answer_question(&cfg, &corpora, &request.question, request.image.as_deref())
    })
    .await;

    match outcome {
        Ok(Ok(answer)) => Ok(Json(answer)),
        Ok(Err(err)) => {
            error!(kind = err.kind(), error = ?err, "generate-answer failed: {}", err);
            Err(internal_error(err.to_string()))
        }
        Err(err) => {
            error!(kind = "task", error = ?err, "generate-answer task failed: {}", err);
            Err(internal_error(err.to_string()))
        }
    }
}

fn internal_error(message: String) -> (StatusCode, Json<ErrorBody>) {
    let detail = if message.trim().is_empty() {
        FALLBACK_DETAIL.to_string()
    } else {
        message
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { detail }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use rag::{Corpora, Corpus, Entry, FlatIndex};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::{header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(text: &str, url: &str) -> Entry {
        serde_json::from_value(json!({"text": text, "metadata": {"url": url}}))
            .expect("entry fixture should deserialize")
    }

    fn corpora() -> Corpora {
        let discourse = Corpus::new(
            "discourse",
            FlatIndex::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).expect("index"),
            vec![
                entry("Use uv to install packages.", "https://discourse.example/t/uv/1"),
                entry("Deadlines are on the portal.", "https://discourse.example/t/deadlines/2"),
            ],
        )
        .expect("discourse corpus");
        let course = Corpus::new(
            "course",
            FlatIndex::from_rows(&[vec![0.9, 0.1]]).expect("index"),
            vec![entry("Module 1 covers uv.", "https://course.example/uv")],
        )
        .expect("course corpus");
        Corpora { discourse, course }
    }

    fn state_for(server: &MockServer) -> AppState {
        let cfg = Config {
            embed_url: format!("{}/v1/embeddings", server.uri()),
            chat_url: format!("{}/openai/v1/chat/completions", server.uri()),
            together_api_key: "together-test".to_string(),
            aiproxy_api_key: "proxy-test".to_string(),
            ..Config::default()
        };
        AppState::new(cfg, CorpusStore::Loaded(Arc::new(corpora())))
    }

    fn post_question(body: Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/generate-answer")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should be readable");
        serde_json::from_slice(&bytes).expect("body should be JSON")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn healthz_is_ok() {
        let server = MockServer::start().await;
        let response = router(state_for(&server))
            .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn answers_with_only_retrieved_links() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header_is("authorization", "Bearer together-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": [{"embedding": [1.0, 0.0]}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let reply = "```json\n{\"answer\": \"Install it with uv.\", \"links\": [\
            {\"url\": \"https://discourse.example/t/uv/1\", \"text\": \"Use uv\"},\
            {\"url\": \"https://made.up/elsewhere\", \"text\": \"invented\"}]}\n```";
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .and(header_is("authorization", "Bearer proxy-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": reply}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = router(state_for(&server))
            .oneshot(post_question(json!({"question": "How do I install packages?"})))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["answer"], "Install it with uv.");
        assert_eq!(
            body["links"],
            json!([{"url": "https://discourse.example/t/uv/1", "text": "Use uv"}])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn embedding_failure_is_a_500_with_detail_and_no_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/openai/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let response = router(state_for(&server))
            .oneshot(post_question(json!({"question": "Anything?"})))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        let detail = body["detail"].as_str().expect("detail should be a string");
        assert!(detail.contains("503"), "unexpected detail: {detail}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn malformed_body_is_rejected_by_the_extractor() {
        let server = MockServer::start().await;
        let response = router(state_for(&server))
            .oneshot(post_question(json!({"image": "abc"})))
            .await
            .expect("router should respond");
        assert!(response.status().is_client_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn preflight_allows_any_origin() {
        let server = MockServer::start().await;
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/generate-answer")
            .header(header::ORIGIN, "https://students.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .expect("request should build");
        let response = router(state_for(&server))
            .oneshot(request)
            .await
            .expect("router should respond");
        assert!(response.status().is_success());
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).map(|v| v.as_bytes()),
            Some(&b"https://students.example"[..])
        );
    }

    #[test]
    fn empty_error_text_falls_back() {
        let (status, Json(body)) = internal_error("  ".to_string());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.detail, FALLBACK_DETAIL);
    }
}

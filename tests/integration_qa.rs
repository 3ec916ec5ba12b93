//! End-to-end pipeline tests: real files on disk, the real chunk/embed/index
//! build, and the HTTP surface, with the embedding and completion endpoints
//! served by wiremock.

use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use docs_qa::answer::AnswerComposer;
use docs_qa::completion::CompletionClient;
use docs_qa::config::{CompletionConfig, Config, OllamaConfig};
use docs_qa::corpus::{SharedCorpus, build_corpus};
use docs_qa::embeddings::{OllamaEncoder, TextEncoder};
use docs_qa::server::{AppState, router};

/// Keyword-counting embedding responder standing in for the encoder model.
/// Deterministic, so corpus and query vectors share one space.
struct KeywordEmbedder;

fn embed(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    vec![
        lower.matches("sky").count() as f32,
        lower.matches("grass").count() as f32,
        1.0,
    ]
}

impl Respond for KeywordEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).expect("embed request is JSON");

        if let Some(prompt) = body.get("prompt").and_then(Value::as_str) {
            return ResponseTemplate::new(200).set_body_json(json!({"embedding": embed(prompt)}));
        }

        let inputs = body["input"].as_array().expect("batch input array");
        let embeddings: Vec<Vec<f32>> = inputs
            .iter()
            .map(|input| embed(input.as_str().expect("string input")))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"embeddings": embeddings}))
    }
}

async fn start_embedding_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbedder)
        .mount(&server)
        .await;
    server
}

fn config_for(docs_dir: &Path, embedding_server: &MockServer) -> Config {
    let url = Url::parse(&embedding_server.uri()).expect("mock server URL");
    let mut config = Config::default();
    config.documents.dir = docs_dir.to_path_buf();
    config.chunking.max_chars = 100;
    config.chunking.overlap_chars = 10;
    config.retrieval.top_k = 3;
    config.embedding.ollama = OllamaConfig {
        protocol: url.scheme().to_string(),
        host: url.host_str().expect("host").to_string(),
        port: url.port().expect("port"),
        ..OllamaConfig::default()
    };
    config
}

fn completion_for(server: &MockServer, api_key: Option<&str>) -> CompletionClient {
    CompletionClient::new(
        &CompletionConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..CompletionConfig::default()
        },
        api_key.map(str::to_string),
    )
    .with_retry_attempts(1)
}

async fn spawn_app(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state))
            .await
            .expect("test server");
    });
    format!("http://{addr}")
}

fn http_post(url: &str, body: &Value) -> (u16, Value) {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into();
    let mut resp = agent
        .post(url)
        .header("Content-Type", "application/json")
        .send(&body.to_string())
        .expect("request");
    let status = resp.status().as_u16();
    let body = resp.body_mut().read_to_string().expect("body");
    (status, serde_json::from_str(&body).expect("JSON body"))
}

fn http_get(url: &str) -> (u16, Value) {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into();
    let mut resp = agent.get(url).call().expect("request");
    let status = resp.status().as_u16();
    let body = resp.body_mut().read_to_string().expect("body");
    (status, serde_json::from_str(&body).expect("JSON body"))
}

async fn build_state(
    config: Config,
    completion: CompletionClient,
) -> AppState {
    let encoder: Arc<dyn TextEncoder> =
        Arc::new(OllamaEncoder::new(&config.embedding.ollama).expect("encoder"));
    let composer = Arc::new(AnswerComposer::new(
        Arc::clone(&encoder),
        completion,
        config.retrieval.top_k,
    ));

    let corpus = SharedCorpus::new();
    let built = {
        let config = config.clone();
        let encoder = Arc::clone(&encoder);
        tokio::task::spawn_blocking(move || build_corpus(&config, encoder.as_ref()))
            .await
            .expect("build task")
            .expect("corpus build")
    };
    corpus.replace(built).await;

    AppState {
        corpus,
        composer,
        encoder,
        config: Arc::new(config),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn question_retrieves_the_right_chunk_and_answers() {
    let docs = TempDir::new().expect("tempdir");
    fs::write(docs.path().join("a.txt"), "The sky is blue. Grass is green.").expect("write");

    let embedding_server = start_embedding_server().await;
    let completion_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "The sky is blue."}}]
        })))
        .mount(&completion_server)
        .await;

    let config = config_for(docs.path(), &embedding_server);
    let state = build_state(config, completion_for(&completion_server, Some("sk-test"))).await;
    let base = spawn_app(state).await;

    let (status, body) = tokio::task::spawn_blocking(move || {
        http_post(
            &format!("{base}/query"),
            &json!({"question": "What color is the sky?"}),
        )
    })
    .await
    .expect("task");

    assert_eq!(status, 200);
    assert_eq!(body["answer"], "The sky is blue.");

    // The composed context handed to the completion call must contain the
    // retrieved chunk verbatim
    let completion_requests = completion_server
        .received_requests()
        .await
        .expect("completion requests");
    assert_eq!(completion_requests.len(), 1);
    let request_body: Value =
        serde_json::from_slice(&completion_requests[0].body).expect("request JSON");
    let user_content = request_body["messages"][1]["content"]
        .as_str()
        .expect("user content");
    assert!(user_content.contains("sky is blue"));
    assert!(user_content.contains("What color is the sky?"));
}

#[tokio::test(flavor = "multi_thread")]
async fn nearest_document_leads_and_top_k_is_clamped() {
    let docs = TempDir::new().expect("tempdir");
    fs::write(docs.path().join("a.txt"), "The sky is blue.").expect("write");
    fs::write(docs.path().join("b.txt"), "Grass is green.").expect("write");

    let embedding_server = start_embedding_server().await;
    let completion_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Blue."}}]
        })))
        .mount(&completion_server)
        .await;

    // top_k = 3 against a two-chunk corpus: both chunks come back, nearest first
    let config = config_for(docs.path(), &embedding_server);
    let state = build_state(config, completion_for(&completion_server, Some("sk-test"))).await;
    let base = spawn_app(state).await;

    let (status, _) = tokio::task::spawn_blocking(move || {
        http_post(
            &format!("{base}/query"),
            &json!({"question": "What color is the sky?"}),
        )
    })
    .await
    .expect("task");
    assert_eq!(status, 200);

    let completion_requests = completion_server
        .received_requests()
        .await
        .expect("completion requests");
    let request_body: Value =
        serde_json::from_slice(&completion_requests[0].body).expect("request JSON");
    let user_content = request_body["messages"][1]["content"]
        .as_str()
        .expect("user content");

    assert!(user_content.starts_with("Context:\nThe sky is blue."));
    assert!(user_content.contains("Grass is green."));
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reflects_the_built_corpus() {
    let docs = TempDir::new().expect("tempdir");
    fs::write(docs.path().join("a.txt"), "The sky is blue.").expect("write");
    fs::write(docs.path().join("b.txt"), "Grass is green.").expect("write");

    let embedding_server = start_embedding_server().await;
    let completion_server = MockServer::start().await;

    let config = config_for(docs.path(), &embedding_server);
    let state = build_state(config, completion_for(&completion_server, Some("sk-test"))).await;
    let base = spawn_app(state).await;

    let (status, body) = tokio::task::spawn_blocking(move || http_get(&format!("{base}/status")))
        .await
        .expect("task");

    assert_eq!(status, 200);
    assert_eq!(body["ready"], true);
    assert_eq!(body["documents"], 2);
    assert_eq!(body["chunks"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_credential_returns_a_structured_error() {
    let docs = TempDir::new().expect("tempdir");
    fs::write(docs.path().join("a.txt"), "The sky is blue. Grass is green.").expect("write");

    let embedding_server = start_embedding_server().await;
    let completion_server = MockServer::start().await;

    let config = config_for(docs.path(), &embedding_server);
    let state = build_state(config, completion_for(&completion_server, None)).await;
    let base = spawn_app(state).await;

    let (status, body) = tokio::task::spawn_blocking(move || {
        http_post(
            &format!("{base}/query"),
            &json!({"question": "What color is the sky?"}),
        )
    })
    .await
    .expect("task");

    assert_eq!(status, 502);
    assert!(
        body["error"]
            .as_str()
            .expect("error string")
            .contains("OPENAI_API_KEY")
    );

    // The completion endpoint must never have been called
    assert!(
        completion_server
            .received_requests()
            .await
            .expect("requests")
            .is_empty()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn office_documents_feed_the_same_pipeline() {
    use std::io::Write;
    use zip::write::FileOptions;

    let docs = TempDir::new().expect("tempdir");
    fs::write(docs.path().join("colors.txt"), "Grass is green.").expect("write");

    // Minimal Word document mentioning the sky
    let docx_xml = concat!(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        "<w:body><w:p><w:r><w:t>The sky is blue above the mountains.</w:t></w:r></w:p></w:body>",
        "</w:document>",
    );
    let file = fs::File::create(docs.path().join("weather.docx")).expect("create docx");
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("word/document.xml", FileOptions::default())
        .expect("zip entry");
    writer.write_all(docx_xml.as_bytes()).expect("zip write");
    writer.finish().expect("zip finish");

    let embedding_server = start_embedding_server().await;
    let completion_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "Blue."}}]
        })))
        .mount(&completion_server)
        .await;

    let config = config_for(docs.path(), &embedding_server);
    let state = build_state(config, completion_for(&completion_server, Some("sk-test"))).await;
    let base = spawn_app(state).await;

    let (status, _) = tokio::task::spawn_blocking(move || {
        http_post(
            &format!("{base}/query"),
            &json!({"question": "What color is the sky?"}),
        )
    })
    .await
    .expect("task");
    assert_eq!(status, 200);

    let completion_requests = completion_server
        .received_requests()
        .await
        .expect("completion requests");
    let request_body: Value =
        serde_json::from_slice(&completion_requests[0].body).expect("request JSON");
    let user_content = request_body["messages"][1]["content"]
        .as_str()
        .expect("user content");

    // The docx chunk wins the retrieval and leads the context
    assert!(user_content.starts_with("Context:\nThe sky is blue above the mountains."));
}

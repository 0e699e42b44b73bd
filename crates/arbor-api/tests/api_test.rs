use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use arbor_api::{config::Config, router, AppState};
use arbor_engine::ConversationService;
use arbor_llm::{MockProvider, MockResponse};
use arbor_persist::MemoryStore;

const CONFIG: &str = r#"
    [server]
    host = "127.0.0.1"
    port = 0

    [cors]
    enabled = true
    origins = ["*"]

    [llm]
    provider = "mock"
    model = "test-model"

    [context]
    max_tokens = 1000

    [storage]
    backend = "memory"
    database = "test"

    [logging]
    level = "debug"
    format = "pretty"
"#;

fn app(provider: Arc<MockProvider>) -> Router {
    let config: Config = toml::from_str(CONFIG).unwrap();
    let service = ConversationService::builder()
        .store(Arc::new(MemoryStore::new()))
        .provider(provider)
        .config(config.conversation())
        .build()
        .unwrap();

    router(Arc::new(AppState::new(config, service)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn id(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app(Arc::new(MockProvider::new(vec![])));
    let (status, body) = call(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["storage"], "connected");
    assert_eq!(body["services"]["backend"], "memory");
}

#[tokio::test]
async fn test_thread_lifecycle() {
    let app = app(Arc::new(MockProvider::new(vec![])));

    let (status, thread) = call(
        &app,
        Method::POST,
        "/threads",
        Some(json!({"name": "Pirates", "system_prompt": "Talk like a pirate."})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let thread_id = id(&thread);

    let (status, fetched) = call(&app, Method::GET, &format!("/threads/{thread_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["system_prompt"], "Talk like a pirate.");

    // Explicit null clears the persona
    let (status, updated) = call(
        &app,
        Method::PATCH,
        &format!("/threads/{thread_id}"),
        Some(json!({"name": "Sailors", "system_prompt": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Sailors");
    assert!(updated["system_prompt"].is_null());

    let (status, list) = call(&app, Method::GET, "/threads?limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["threads"].as_array().unwrap().len(), 1);
    assert_eq!(list["has_more"], false);

    let (status, _) = call(&app, Method::DELETE, &format!("/threads/{thread_id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&app, Method::GET, &format!("/threads/{thread_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_list_threads_reports_more() {
    let app = app(Arc::new(MockProvider::new(vec![])));
    for name in ["a", "b", "c"] {
        call(&app, Method::POST, "/threads", Some(json!({"name": name}))).await;
    }

    let (_, list) = call(&app, Method::GET, "/threads?limit=2", None).await;
    assert_eq!(list["threads"].as_array().unwrap().len(), 2);
    assert_eq!(list["has_more"], true);
}

#[tokio::test]
async fn test_send_message_creates_thread() {
    let provider = Arc::new(MockProvider::replying("Ahoy!", 1));
    let app = app(provider.clone());

    let (status, turn) = call(
        &app,
        Method::POST,
        "/messages",
        Some(json!({"content": "Hello there"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(turn["thread"]["name"], "Hello there");
    assert_eq!(turn["message"]["role"], "user");
    assert!(turn["message"]["parent_message_id"].is_null());
    assert_eq!(turn["reply"]["content"], "Ahoy!");
    assert_eq!(turn["reply"]["parent_message_id"], turn["message"]["id"]);
    assert!(turn["generation_error"].is_null());
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn test_thread_tree_and_context() {
    let provider = Arc::new(MockProvider::replying("reply", 2));
    let app = app(provider);

    let (_, thread) = call(&app, Method::POST, "/threads", Some(json!({"name": "t"}))).await;
    let thread_id = id(&thread);

    let (_, first) = call(
        &app,
        Method::POST,
        &format!("/threads/{thread_id}/messages"),
        Some(json!({"content": "first"})),
    )
    .await;
    let first_reply = id(&first["reply"]);

    let (status, second) = call(
        &app,
        Method::POST,
        &format!("/threads/{thread_id}/messages"),
        Some(json!({"content": "second", "parent_id": first_reply})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, view) = call(&app, Method::GET, &format!("/threads/{thread_id}/tree"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["tree"].as_array().unwrap().len(), 1);
    assert_eq!(view["deepest_path"].as_array().unwrap().len(), 4);

    let second_id = id(&second["message"]);
    let (status, window) = call(
        &app,
        Method::GET,
        &format!("/messages/{second_id}/context"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // Path to the selected message plus its first reply
    assert_eq!(window["path"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_edit_rejects_assistant_message() {
    let app = app(Arc::new(MockProvider::replying("reply", 1)));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let reply_id = id(&turn["reply"]);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/messages/{reply_id}"),
        Some(json!({"content": "rewritten"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_edit_prunes_replies() {
    let app = app(Arc::new(MockProvider::replying("reply", 2)));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let message_id = id(&turn["message"]);

    let (status, edit) = call(
        &app,
        Method::PUT,
        &format!("/messages/{message_id}"),
        Some(json!({"content": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edit["message"]["content"], "hello");
    assert_eq!(edit["deleted_descendant_count"], 1);

    let (status, regen) = call(
        &app,
        Method::PUT,
        &format!("/messages/{message_id}"),
        Some(json!({"content": "hello again", "regenerate": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(regen["deleted_descendant_count"], 0);
    assert_eq!(regen["reply"]["parent_message_id"], message_id.as_str());
}

#[tokio::test]
async fn test_delete_message_subtree() {
    let app = app(Arc::new(MockProvider::replying("reply", 1)));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let message_id = id(&turn["message"]);

    let (status, body) = call(&app, Method::DELETE, &format!("/messages/{message_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/messages/{message_id}/context"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_branch_and_context_flag() {
    let app = app(Arc::new(MockProvider::replying("reply", 2)));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let message_id = id(&turn["message"]);
    let reply_id = id(&turn["reply"]);

    // Branching off an assistant reply adds a sibling under the same user turn
    let (status, branch) = call(
        &app,
        Method::POST,
        &format!("/messages/{reply_id}/branch"),
        Some(json!({"content": "an alternative answer", "role": "assistant"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(branch["parent_message_id"], message_id.as_str());
    assert_eq!(branch["role"], "assistant");

    let (status, generated) = call(
        &app,
        Method::POST,
        &format!("/messages/{message_id}/branch"),
        Some(json!({"content": "another question", "generate": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(generated["message"]["parent_message_id"].is_null());
    assert_eq!(generated["reply"]["content"], "reply");

    let (status, flagged) = call(
        &app,
        Method::PATCH,
        &format!("/messages/{message_id}/context"),
        Some(json!({"is_context": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flagged["is_context"], false);
}

#[tokio::test]
async fn test_generate_only_user_branches() {
    let app = app(Arc::new(MockProvider::replying("reply", 1)));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let reply_id = id(&turn["reply"]);

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/messages/{reply_id}/branch"),
        Some(json!({"content": "x", "role": "assistant", "generate": true})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_regenerate_without_body() {
    let app = app(Arc::new(MockProvider::new(vec![
        MockResponse::text("one"),
        MockResponse::text("two"),
    ])));
    let (_, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    let reply_id = id(&turn["reply"]);

    let (status, regen) = call(
        &app,
        Method::POST,
        &format!("/messages/{reply_id}/regenerate"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(regen["reply"]["content"], "two");
    assert_eq!(regen["reply"]["parent_message_id"], turn["message"]["id"]);
}

#[tokio::test]
async fn test_provider_failure_keeps_user_turn() {
    let app = app(Arc::new(MockProvider::new(vec![MockResponse::error("boom")])));

    let (status, turn) = call(&app, Method::POST, "/messages", Some(json!({"content": "hi"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(turn["reply"].is_null());
    assert!(turn["generation_error"].as_str().unwrap().contains("boom"));

    let thread_id = turn["thread"]["id"].as_str().unwrap();
    let (_, view) = call(&app, Method::GET, &format!("/threads/{thread_id}/tree"), None).await;
    assert_eq!(view["deepest_path"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bad_input() {
    let app = app(Arc::new(MockProvider::new(vec![])));

    let (status, body) = call(&app, Method::POST, "/messages", Some(json!({"content": 5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, Method::POST, "/messages", Some(json!({"content": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/messages",
        Some(json!({"content": "hi", "thread_id": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::POST,
        "/messages",
        Some(json!({"content": "hi", "parent_id": "missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

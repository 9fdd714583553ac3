//! Chat client and conversation against an in-process mock backend.
//!
//! Run with: `cargo test -p edu-avatar-chat --test backend`

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use serde_json::{Value, json};

use edu_avatar_chat::conversation::CONNECTION_ERROR_MESSAGE;
use edu_avatar_chat::{ChatBackend, ChatClient, ChatError, Conversation, SendOutcome, StudentContext};
use edu_avatar_core::config::PromptsConfig;
use edu_avatar_core::types::{ChatMessage, ChatMode};

#[derive(Clone, Default)]
struct MockBackend {
    bodies: Arc<Mutex<Vec<Value>>>,
    // Response bodies handed out in order; empty means 503.
    responses: Arc<Mutex<Vec<Value>>>,
}

async fn chat(State(mock): State<MockBackend>, axum::Json(body): axum::Json<Value>) -> impl IntoResponse {
    mock.bodies.lock().unwrap().push(body);
    let mut responses = mock.responses.lock().unwrap();
    if responses.is_empty() {
        return (StatusCode::SERVICE_UNAVAILABLE, "overloaded").into_response();
    }
    axum::Json(responses.remove(0)).into_response()
}

async fn start_mock(mock: MockBackend) -> String {
    let app = Router::new()
        .route("/chatbot/chat", post(chat))
        .with_state(mock);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn mock_with(responses: Vec<Value>) -> MockBackend {
    MockBackend {
        responses: Arc::new(Mutex::new(responses)),
        ..MockBackend::default()
    }
}

#[tokio::test]
async fn test_talk_posts_history_and_reads_choices() {
    let mock = mock_with(vec![json!({ "choices": [{ "message": { "content": "Nice intro." } }] })]);
    let base = start_mock(mock.clone()).await;

    let client = ChatClient::new(&base);
    let reply = client
        .talk(&[ChatMessage::user("Read my intro")], "sk-live", "gpt-4o")
        .await
        .unwrap();
    assert_eq!(reply, "Nice intro.");

    let bodies = mock.bodies.lock().unwrap();
    assert_eq!(bodies[0]["api_key"], "sk-live");
    assert_eq!(bodies[0]["model_name"], "gpt-4o");
    assert_eq!(bodies[0]["chat_history"][0]["role"], "user");
    assert_eq!(bodies[0]["chat_history"][0]["content"], "Read my intro");
}

#[tokio::test]
async fn test_talk_status_error() {
    let base = start_mock(MockBackend::default()).await;
    let err = ChatClient::new(&base)
        .talk(&[ChatMessage::user("hi")], "k", "m")
        .await
        .unwrap_err();
    match err {
        ChatError::Status { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_conversation_training_turn_with_bullet_points() {
    let mock = mock_with(vec![
        json!({ "response": "Consider a counterargument." }),
        json!({ "message": "- Thesis is clear\n- Add a counterargument paragraph" }),
    ]);
    let base = start_mock(mock.clone()).await;

    let conversation = Conversation::new(
        Arc::new(ChatClient::new(&base)),
        PromptsConfig {
            training: "You are a writing coach. ".into(),
            bullet_points: "Summarize as bullet points:\n".into(),
            ..PromptsConfig::default()
        },
    );
    conversation.set_api_key(Some("sk-live".into()));
    conversation.set_mode(ChatMode::Training);
    conversation.set_context(StudentContext {
        course_info: Some("Writing 2".into()),
        original_draft: Some("School uniforms are good.".into()),
        ..StudentContext::default()
    });
    conversation.confirm_original_draft(true);

    let outcome = conversation.send_message("How can I improve?").await;
    assert_eq!(
        outcome,
        SendOutcome::Replied("Consider a counterargument.".into())
    );
    assert_eq!(
        conversation.bullet_points().as_deref(),
        Some("- Thesis is clear\n- Add a counterargument paragraph")
    );

    let bodies = mock.bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    let system = bodies[0]["chat_history"][0]["content"].as_str().unwrap();
    assert!(system.starts_with("You are a writing coach. These are the student information details:"));
    assert!(system.contains("Course Info: Writing 2"));
    assert!(system.contains("Final Draft:\n---\n(empty)"));
    assert_eq!(bodies[0]["chat_history"][1]["content"], "How can I improve?");
}

#[tokio::test]
async fn test_conversation_server_error_message() {
    let base = start_mock(MockBackend::default()).await;
    let conversation = Conversation::new(Arc::new(ChatClient::new(&base)), PromptsConfig::default());
    conversation.set_api_key(Some("sk-live".into()));

    let outcome = conversation.send_message("Hello").await;
    assert!(matches!(outcome, SendOutcome::Failed(_)));
    assert_eq!(
        conversation.history().last().map(|m| m.content.as_str()),
        Some(CONNECTION_ERROR_MESSAGE)
    );
}

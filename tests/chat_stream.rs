//! End-to-end chat turn tests against a mock back office

use proptest::prelude::*;
use qbank_chat::api::ApiError;
use qbank_chat::auth::{AuthSession, MemorySessionStore};
use qbank_chat::stream::{ChatEvent, SessionEventDispatcher, TurnError};
use qbank_chat::{ChatClient, Config};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TURN: &str = concat!(
    "data: {\"type\":\"task\",\"id\":\"t0\",\"taskType\":\"processing\",\"phase\":\"pre\"}\n\n",
    "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"Hel\"}\n\n",
    ": keep-alive\n\n",
    "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"lo 한국\"}\n\n",
    "data: {\"type\":\"task\",\"id\":\"t1\",\"taskType\":\"generate-question\",\"phase\":\"post\",",
    "\"generatedQuestion\":\"<p>2+2?</p>\",\"generatedAnswer\":\"4\",\"generatedSolution\":\"<p>add</p>\",",
    "\"generatedSelections\":[\"1\",\"2\",\"3\",\"4\",\"5\"]}\n\n",
    "data: {\"type\":\"mystery\"}\n\n",
    "data: {\"type\":\"assistant-chat-complete\",\"message\":{\"id\":\"m2\",\"order\":2,",
    "\"createdAt\":\"2024-05-01T10:00:00Z\",\"speaker\":\"assistant\",",
    "\"contents\":[{\"type\":\"text\",\"text\":\"Hello 한국\"}]}}\n\n",
    "data: {\"type\":\"turn-end\"}\n\n",
    "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"late\"}\n\n",
);

fn describe(event: &ChatEvent) -> String {
    match event {
        ChatEvent::PartialContent(delta) => format!("delta:{}", delta),
        ChatEvent::TaskUpdate(task) => format!("task:{}:{}", task.task_type, task.phase.as_str()),
        ChatEvent::QuestionGenerated(q) => format!("question:{}:{}", q.question, q.answer),
        ChatEvent::Complete(message) => format!("complete:{}", message.text()),
        ChatEvent::Error(e) => format!("error:{}", e),
    }
}

async fn client(server: &MockServer, session: AuthSession) -> ChatClient {
    let mut config = Config::default();
    config.set_base_url(&server.uri());
    let store = Arc::new(MemorySessionStore::with_session(session));
    ChatClient::from_config(&config, store).await.unwrap()
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

#[tokio::test]
async fn test_full_turn_event_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .and(header("authorization", "Bearer tok"))
        .and(header("accept", "text/event-stream"))
        .and(body_json(serde_json::json!({
            "message": "make a question",
            "imageFileIds": ["f1"]
        })))
        .respond_with(sse(TURN))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client
        .send_message_with(
            "s1",
            "make a question",
            &["f1".to_string()],
            Box::new(move |event: ChatEvent| sink.lock().unwrap().push(describe(&event))),
        )
        .await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "task:processing:pre",
            "delta:Hel",
            "delta:lo 한국",
            "task:generate-question:post",
            "question:<p>2+2?</p>:4",
            "complete:Hello 한국",
        ]
    );
}

#[tokio::test]
async fn test_turn_stream_tracks_content_and_task() {
    use futures::StreamExt;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(sse(TURN))
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let mut turn = client.send_message("s1", "hi", &[]).await;

    let first = turn.next().await.unwrap();
    assert_eq!(describe(&first), "task:processing:pre");
    assert_eq!(
        turn.current_task().map(|t| t.task_type.as_str()),
        Some("processing")
    );

    while turn.next().await.is_some() {}
    assert_eq!(turn.content(), "Hello 한국");
    assert!(turn.current_task().is_none());
}

#[tokio::test]
async fn test_error_event_ends_turn() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"Hi\"}\n\n",
        "data: {\"type\":\"error\",\"error\":\"quota exceeded\"}\n\n",
        "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"more\"}\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    client
        .send_message_with(
            "s1",
            "hi",
            &[],
            Box::new(move |event: ChatEvent| sink.lock().unwrap().push(describe(&event))),
        )
        .await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], "delta:Hi");
    assert!(seen[1].starts_with("error:Server error: "), "{}", seen[1]);
    assert!(seen[1].contains("quota exceeded"));
}

#[tokio::test]
async fn test_error_line_is_delivered_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(sse("data: [ERROR] model overloaded\n\n"))
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let mut events = Vec::new();
    let mut turn = client.send_message("s1", "hi", &[]).await;
    while let Some(event) = futures::StreamExt::next(&mut turn).await {
        events.push(event);
    }

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ChatEvent::Error(TurnError::ErrorLine(line)) if line == "[ERROR] model overloaded"
    ));
}

#[tokio::test]
async fn test_failed_open_yields_single_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let mut events = Vec::new();
    let mut turn = client.send_message("s1", "hi", &[]).await;
    while let Some(event) = futures::StreamExt::next(&mut turn).await {
        events.push(event);
    }

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        ChatEvent::Error(TurnError::Api(ApiError::Service(body))) if body == "boom"
    ));
}

#[tokio::test]
async fn test_expired_login_surfaces_as_session_expired() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok").with_refresh_token("r")).await;
    let mut turn = client.send_message("s1", "hi", &[]).await;
    let event = futures::StreamExt::next(&mut turn).await.unwrap();

    match event {
        ChatEvent::Error(e) => assert!(e.is_session_expired(), "unexpected error: {e}"),
        other => panic!("expected error, got {}", describe(&other)),
    }
    assert!(futures::StreamExt::next(&mut turn).await.is_none());
    assert!(!client.gateway().session().is_signed_in());
}

#[tokio::test]
async fn test_body_without_turn_end_completes_quietly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat-sessions/s1/response"))
        .respond_with(sse(
            "data: {\"type\":\"assistant-chat-partial-content\",\"partialContent\":\"tail\"}",
        ))
        .mount(&server)
        .await;

    let client = client(&server, AuthSession::new("tok")).await;
    let mut seen = Vec::new();
    let mut turn = client.send_message("s1", "hi", &[]).await;
    while let Some(event) = futures::StreamExt::next(&mut turn).await {
        seen.push(describe(&event));
    }

    assert_eq!(seen, vec!["delta:tail"]);
}

fn dispatch_in_chunks(body: &[u8], cuts: &[usize]) -> Vec<String> {
    let mut dispatcher = SessionEventDispatcher::new();
    let mut events = Vec::new();
    let mut start = 0;
    for &cut in cuts {
        events.extend(dispatcher.push(&body[start..cut]));
        start = cut;
    }
    events.extend(dispatcher.push(&body[start..]));
    events.extend(dispatcher.finish());
    events.iter().map(describe).collect()
}

proptest! {
    #[test]
    fn prop_chunk_boundaries_do_not_change_events(
        mut cuts in prop::collection::vec(0..TURN.len(), 0..12)
    ) {
        cuts.sort_unstable();
        cuts.dedup();

        let whole = dispatch_in_chunks(TURN.as_bytes(), &[]);
        let split = dispatch_in_chunks(TURN.as_bytes(), &cuts);
        prop_assert_eq!(split, whole);
    }

    #[test]
    fn prop_byte_at_a_time_matches(skip_done in any::<bool>()) {
        let mut body = TURN.replace("data: {\"type\":\"turn-end\"}\n\n", "");
        if !skip_done {
            body.push_str("data: [DONE]\n\n");
        }
        let cuts: Vec<usize> = (1..body.len()).collect();

        let whole = dispatch_in_chunks(body.as_bytes(), &[]);
        let split = dispatch_in_chunks(body.as_bytes(), &cuts);
        prop_assert_eq!(&split, &whole);
        // without turn-end the late delta is still part of the turn
        prop_assert_eq!(whole.last().map(String::as_str), Some("delta:late"));
    }
}

//! Integration tests for the realtime room protocol: join handshake, speaker
//! slot, listener headcount and the quiz broadcast flow.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Helper: start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = lectern_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = lectern_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");
    let state = lectern_server::state::AppState {
        db,
        verifier: lectern_server::auth::jwt::IdentityVerifier::new(jwt_secret, 3600),
        sessions: lectern_server::session::spawn_session_loop(Default::default()),
    };

    let app = lectern_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

/// Register and log in a user, returning (access_token, user_id).
async fn register_and_login(base_url: &str, username: &str, role: &str) -> (String, i64) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({ "username": username, "password": "pw-123456", "role": role }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Registration failed for {}", username);

    let resp = client
        .post(format!("{}/api/auth/login", base_url))
        .json(&json!({ "username": username, "password": "pw-123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200, "Login failed for {}", username);
    let body: Value = resp.json().await.unwrap();
    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user_id"].as_i64().unwrap(),
    )
}

async fn create_presentation(base_url: &str, token: &str, title: &str) -> i64 {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/presentations", base_url))
        .bearer_auth(token)
        .json(&json!({ "title": title }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["presentation_id"].as_i64().unwrap()
}

async fn connect(addr: SocketAddr, token: Option<&str>) -> Ws {
    let url = match token {
        Some(token) => format!("ws://{}/ws?token={}", addr, token),
        None => format!("ws://{}/ws", addr),
    };
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect WebSocket");
    ws
}

async fn send_event(ws: &mut Ws, event: Value) {
    ws.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Next JSON event frame, skipping control frames.
async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("WebSocket closed")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert nothing but control frames arrive within a short window.
async fn expect_silence(ws: &mut Ws) {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Text(text)))) => panic!("Unexpected event: {}", text.as_str()),
            Ok(Some(Ok(_))) => continue,
            Ok(other) => panic!("Unexpected stream state: {:?}", other),
        }
    }
}

async fn join(ws: &mut Ws, presentation_id: i64, role: &str, credential: Option<&str>) {
    let mut data = json!({ "presentation_id": presentation_id, "role": role });
    if let Some(credential) = credential {
        data["credential"] = json!(credential);
    }
    send_event(ws, json!({ "event": "join", "data": data })).await;
}

#[tokio::test]
async fn test_end_to_end_quiz_flow() {
    let (base_url, addr) = start_test_server().await;
    let (speaker_token, _) = register_and_login(&base_url, "speaker1", "speaker").await;
    let (listener_token, _) = register_and_login(&base_url, "listener1", "listener").await;
    let pid = create_presentation(&base_url, &speaker_token, "Rust in Production").await;
    let client = reqwest::Client::new();

    // Speaker joins with an inline token and no credential in the join
    let mut speaker = connect(addr, Some(&speaker_token)).await;
    join(&mut speaker, pid, "speaker", None).await;
    let joined = next_event(&mut speaker).await;
    assert_eq!(joined["event"], "joined");
    assert_eq!(joined["data"]["presentation_id"], pid);
    assert_eq!(joined["data"]["role"], "speaker");
    let info = next_event(&mut speaker).await;
    assert_eq!(info["event"], "room_info");
    assert_eq!(info["data"]["listeners_count"], 0);

    // Listener authenticates through the join handshake
    let mut listener = connect(addr, None).await;
    join(&mut listener, pid, "listener", Some(&listener_token)).await;
    assert_eq!(next_event(&mut listener).await["event"], "joined");
    let note = next_event(&mut speaker).await;
    assert_eq!(note["event"], "notification");
    assert_eq!(note["data"]["type"], "listener_joined");
    assert_eq!(note["data"]["listeners_count"], 1);

    // Speaker creates a question; the whole room sees it
    let resp = client
        .post(format!("{}/api/quiz/presentations/{}/questions", base_url, pid))
        .bearer_auth(&speaker_token)
        .json(&json!({
            "question_text": "Which letter comes first?",
            "options": ["A", "B", "C"],
            "correct_answer": "A",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let qid = resp.json::<Value>().await.unwrap()["question_id"].as_i64().unwrap();

    for ws in [&mut speaker, &mut listener] {
        let event = next_event(ws).await;
        assert_eq!(event["event"], "new_question");
        assert_eq!(event["data"]["id"], qid);
        assert_eq!(event["data"]["is_active"], true);
        assert_eq!(event["data"]["question_type"], "multiple_choice");
    }

    // Listener answers correctly; the room gets live stats
    let resp = client
        .post(format!("{}/api/quiz/questions/{}/answer", base_url, qid))
        .bearer_auth(&listener_token)
        .json(&json!({ "answer_text": "A" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.json::<Value>().await.unwrap()["is_correct"], true);

    for ws in [&mut speaker, &mut listener] {
        let event = next_event(ws).await;
        assert_eq!(event["event"], "question_stats_update");
        assert_eq!(event["data"]["question_id"], qid);
        assert_eq!(event["data"]["total_answers"], 1);
        assert_eq!(event["data"]["correct_answers"], 1);
        assert_eq!(event["data"]["correct_rate"], "100.00%");
        assert_eq!(event["data"]["option_distribution"]["A"], 1);
    }

    // Speaker deactivates the question
    let resp = client
        .post(format!("{}/api/quiz/questions/{}/deactivate", base_url, qid))
        .bearer_auth(&speaker_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["stats"]["total_answers"], 1);

    for ws in [&mut speaker, &mut listener] {
        let event = next_event(ws).await;
        assert_eq!(event["event"], "question_deactivated");
        assert_eq!(event["data"]["question_id"], qid);
        assert_eq!(event["data"]["presentation_id"], pid);
        assert_eq!(next_event(ws).await["event"], "question_stats_update");
    }

    // Listener leaves explicitly
    send_event(&mut listener, json!({ "event": "leave" })).await;
    let left = next_event(&mut listener).await;
    assert_eq!(left["event"], "left");
    assert_eq!(left["data"]["presentation_id"], pid);
    let note = next_event(&mut speaker).await;
    assert_eq!(note["data"]["type"], "listener_left");
    assert_eq!(note["data"]["listeners_count"], 0);
}

#[tokio::test]
async fn test_bad_credential_keeps_connection_open() {
    let (base_url, addr) = start_test_server().await;
    let (speaker_token, _) = register_and_login(&base_url, "speaker1", "speaker").await;
    let pid = create_presentation(&base_url, &speaker_token, "Talk").await;

    // An invalid inline token does not refuse the upgrade
    let mut ws = connect(addr, Some("garbage")).await;
    join(&mut ws, pid, "speaker", None).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["msg"], "Authentication failed");

    join(&mut ws, pid, "speaker", Some("also-garbage")).await;
    assert_eq!(next_event(&mut ws).await["event"], "error");

    // Same socket, valid credential: late authentication succeeds
    join(&mut ws, pid, "speaker", Some(&speaker_token)).await;
    assert_eq!(next_event(&mut ws).await["event"], "joined");
    assert_eq!(next_event(&mut ws).await["event"], "room_info");
}

#[tokio::test]
async fn test_join_unknown_presentation() {
    let (base_url, addr) = start_test_server().await;
    let (token, _) = register_and_login(&base_url, "listener1", "listener").await;

    let mut ws = connect(addr, Some(&token)).await;
    join(&mut ws, 9999, "listener", None).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["msg"], "Presentation not found");
}

#[tokio::test]
async fn test_claimed_speaker_role_is_cross_checked() {
    let (base_url, addr) = start_test_server().await;
    let (owner_token, _) = register_and_login(&base_url, "owner", "speaker").await;
    let (other_token, _) = register_and_login(&base_url, "other", "speaker").await;
    let (listener_token, _) = register_and_login(&base_url, "listener1", "listener").await;
    let pid = create_presentation(&base_url, &owner_token, "Talk").await;

    // A listener account cannot take the speaker slot
    let mut ws = connect(addr, Some(&listener_token)).await;
    join(&mut ws, pid, "speaker", None).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["msg"], "Only the presentation's speaker can join as speaker");

    // Neither can a speaker who does not own the presentation
    let mut ws = connect(addr, Some(&other_token)).await;
    join(&mut ws, pid, "speaker", None).await;
    assert_eq!(next_event(&mut ws).await["event"], "error");

    // A speaker account cannot sit in the audience
    join(&mut ws, pid, "listener", None).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["data"]["msg"], "'listener' role required");
}

#[tokio::test]
async fn test_newest_speaker_connection_takes_slot() {
    let (base_url, addr) = start_test_server().await;
    let (speaker_token, _) = register_and_login(&base_url, "speaker1", "speaker").await;
    let (listener_token, _) = register_and_login(&base_url, "listener1", "listener").await;
    let pid = create_presentation(&base_url, &speaker_token, "Talk").await;

    let mut first = connect(addr, Some(&speaker_token)).await;
    join(&mut first, pid, "speaker", None).await;
    next_event(&mut first).await;
    next_event(&mut first).await;

    let mut second = connect(addr, Some(&speaker_token)).await;
    join(&mut second, pid, "speaker", None).await;
    assert_eq!(next_event(&mut second).await["event"], "joined");
    assert_eq!(next_event(&mut second).await["event"], "room_info");

    let note = next_event(&mut first).await;
    assert_eq!(note["event"], "notification");
    assert_eq!(note["data"]["type"], "speaker_changed");

    // Only the new holder hears about arriving listeners
    let mut listener = connect(addr, Some(&listener_token)).await;
    join(&mut listener, pid, "listener", None).await;
    next_event(&mut listener).await;
    assert_eq!(next_event(&mut second).await["data"]["type"], "listener_joined");
    expect_silence(&mut first).await;

    // The displaced connection closing leaves the new holder in place
    first.close(None).await.unwrap();
    drop(first);
    let body: Value = reqwest::Client::new()
        .get(format!("{}/api/presentations/{}", base_url, pid))
        .bearer_auth(&speaker_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["live"]["speaker_connected"], true);
    assert_eq!(body["live"]["listeners_count"], 1);
}

#[tokio::test]
async fn test_listener_disconnect_updates_headcount() {
    let (base_url, addr) = start_test_server().await;
    let (speaker_token, _) = register_and_login(&base_url, "speaker1", "speaker").await;
    let (listener_token, _) = register_and_login(&base_url, "listener1", "listener").await;
    let pid = create_presentation(&base_url, &speaker_token, "Talk").await;

    let mut speaker = connect(addr, Some(&speaker_token)).await;
    join(&mut speaker, pid, "speaker", None).await;
    next_event(&mut speaker).await;
    next_event(&mut speaker).await;

    let mut listener = connect(addr, Some(&listener_token)).await;
    join(&mut listener, pid, "listener", None).await;
    next_event(&mut listener).await;
    assert_eq!(next_event(&mut speaker).await["data"]["listeners_count"], 1);

    // Re-joining the same seat is acknowledged without a second arrival
    join(&mut listener, pid, "listener", None).await;
    assert_eq!(next_event(&mut listener).await["event"], "joined");

    listener.close(None).await.unwrap();
    let note = next_event(&mut speaker).await;
    assert_eq!(note["data"]["type"], "listener_left");
    assert_eq!(note["data"]["listeners_count"], 0);
}

#[tokio::test]
async fn test_binary_and_malformed_frames_get_error_events() {
    let (_base_url, addr) = start_test_server().await;
    let mut ws = connect(addr, None).await;

    ws.send(Message::Binary(vec![0u8, 1, 2].into())).await.unwrap();
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert!(err["data"]["msg"].as_str().unwrap().contains("Binary frames"));

    ws.send(Message::Text("{\"event\":\"dance\"}".into())).await.unwrap();
    let err = next_event(&mut ws).await;
    assert_eq!(err["event"], "error");
    assert!(err["data"]["msg"].as_str().unwrap().starts_with("Malformed event"));

    send_event(&mut ws, json!({ "event": "leave" })).await;
    let err = next_event(&mut ws).await;
    assert_eq!(err["data"]["msg"], "Not joined to any presentation");
}

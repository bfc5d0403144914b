//! Loopback WebSocket tests for the streaming transcription session.
//!
//! Each test spins up a local server that plays the remote recognition
//! service, scripted per scenario.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use voicepipe::{SessionError, SessionState, StreamingSession};

type ServerWs = WebSocketStream<TcpStream>;

/// Bind a loopback listener and serve exactly one connection with the
/// given handler. Returns the ws:// URL to dial.
async fn spawn_server<F, Fut>(handler: F) -> String
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{}", addr)
}

fn final_result(transcript: &str) -> Message {
    let body = serde_json::json!({
        "channel": { "alternatives": [{ "transcript": transcript }] },
        "is_final": true,
    });
    Message::Text(body.to_string().into())
}

fn interim_result(transcript: &str) -> Message {
    let body = serde_json::json!({
        "channel": { "alternatives": [{ "transcript": transcript }] },
        "is_final": false,
    });
    Message::Text(body.to_string().into())
}

fn finalize_ack() -> Message {
    Message::Text(r#"{"type":"Finalize"}"#.to_string().into())
}

/// Read frames until the finalize control message arrives.
async fn wait_for_finalize_request(ws: &mut ServerWs) {
    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            if text.as_str().contains("Finalize") {
                return;
            }
        }
    }
    panic!("connection ended before a finalize request arrived");
}

/// Drain the socket so the close handshake can complete.
async fn drain(mut ws: ServerWs) {
    while ws.next().await.is_some() {}
}

#[tokio::test]
async fn finish_returns_joined_final_segments() {
    let url = spawn_server(|mut ws| async move {
        ws.send(final_result("hello")).await.unwrap();
        ws.send(final_result("world")).await.unwrap();
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    let transcript = session.finish().await.unwrap();
    assert_eq!(transcript, "hello world");
    // The acknowledgement resolved the wait; the timeout never fired.
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn interim_results_are_discarded() {
    let url = spawn_server(|mut ws| async move {
        ws.send(interim_result("hel")).await.unwrap();
        ws.send(interim_result("hello wor")).await.unwrap();
        ws.send(final_result("hello world")).await.unwrap();
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.finish().await.unwrap(), "hello world");
}

#[tokio::test]
async fn empty_final_segments_are_skipped() {
    let url = spawn_server(|mut ws| async move {
        ws.send(final_result("")).await.unwrap();
        ws.send(final_result("kept")).await.unwrap();
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.finish().await.unwrap(), "kept");
}

#[tokio::test]
async fn malformed_envelopes_do_not_kill_the_loop() {
    let url = spawn_server(|mut ws| async move {
        ws.send(Message::Text("this is not json".to_string().into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"channel":42}"#.to_string().into()))
            .await
            .unwrap();
        ws.send(final_result("still alive")).await.unwrap();
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.finish().await.unwrap(), "still alive");
}

#[tokio::test]
async fn finish_falls_back_to_timeout_without_ack() {
    let url = spawn_server(|mut ws| async move {
        ws.send(final_result("partial")).await.unwrap();
        // Never acknowledge; just keep the connection open.
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    let transcript = session.finish().await.unwrap();
    let elapsed = start.elapsed();
    assert_eq!(transcript, "partial");
    assert!(elapsed >= Duration::from_millis(2900), "returned too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(4500), "blocked too long: {:?}", elapsed);
}

#[tokio::test]
async fn speech_final_resolves_a_pending_finish() {
    let url = spawn_server(|mut ws| async move {
        wait_for_finalize_request(&mut ws).await;
        let body = serde_json::json!({
            "channel": { "alternatives": [{ "transcript": "tail" }] },
            "is_final": true,
            "speech_final": true,
        });
        ws.send(Message::Text(body.to_string().into())).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    let start = Instant::now();
    let transcript = session.finish().await.unwrap();
    assert_eq!(transcript, "tail");
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn duplicate_acks_resolve_exactly_once() {
    let url = spawn_server(|mut ws| async move {
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    let transcript = session.finish().await.unwrap();
    assert_eq!(transcript, "");

    // The session is terminal now; a second finish must refuse.
    match session.finish().await {
        Err(SessionError::InvalidState(_)) => {}
        other => panic!("expected InvalidState, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn send_audio_never_raises() {
    let url = spawn_server(|mut ws| async move {
        wait_for_finalize_request(&mut ws).await;
        ws.send(finalize_ack()).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();

    // Empty frames are a no-op; real frames go through.
    session.send_audio(&[]).await;
    session.send_audio(&[0u8; 320]).await;

    session.finish().await.unwrap();

    // After close, frames are silently ignored.
    session.send_audio(&[0u8; 320]).await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn error_callback_fires_once_on_abrupt_disconnect() {
    let url = spawn_server(|mut ws| async move {
        // Wait for one audio frame, then vanish without a close handshake.
        let _ = ws.next().await;
        let stream = ws.get_mut();
        let _ = tokio::io::AsyncWriteExt::shutdown(stream).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = calls.clone();
    session.set_error_callback(move |_err| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    session.send_audio(&[0u8; 320]).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.state(), SessionState::Failed);

    // A failed session returns whatever accumulated, immediately.
    let start = Instant::now();
    let transcript = session.finish().await.unwrap();
    assert_eq!(transcript, "");
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn invalidate_tears_down_without_waiting() {
    let url = spawn_server(|mut ws| async move {
        ws.send(final_result("discarded")).await.unwrap();
        drain(ws).await;
    })
    .await;

    let session = StreamingSession::connect_to(&url, "test-key").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    session.invalidate();
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(session.state(), SessionState::Closed);

    // finish() and invalidate() are mutually exclusive.
    assert!(matches!(
        session.finish().await,
        Err(SessionError::InvalidState(_))
    ));
}

#[tokio::test]
async fn connect_rejects_empty_credential() {
    let result = StreamingSession::connect_to("ws://127.0.0.1:9", "").await;
    assert!(matches!(result, Err(SessionError::InvalidCredential(_))));
}

#[tokio::test]
async fn connect_failure_is_synchronous_and_fatal() {
    // Grab a free port, then close the listener so the dial is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = StreamingSession::connect_to(&format!("ws://{}", addr), "test-key").await;
    assert!(matches!(result, Err(SessionError::Connect(_))));
}

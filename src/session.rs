//! Streaming transcription session.
//!
//! Owns one persistent WebSocket connection to the remote recognition
//! service. Audio frames are pushed in as binary messages while a
//! background receive loop accumulates finalized transcript segments;
//! `finish()` runs the finalize handshake and returns the joined
//! transcript. A session is created per utterance and torn down with
//! exactly one of `finish()` or `invalidate()`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::SessionError;

/// Production recognition endpoint.
pub const STREAM_ENDPOINT: &str = "wss://api.deepgram.com/v1/listen";

/// Control message type for the finalize handshake. The remote echoes
/// the same type back once its buffers are flushed.
const FINALIZE_TYPE: &str = "Finalize";

/// How long `finish()` waits for a finalize acknowledgement before
/// falling back to whatever segments have accumulated.
const FINALIZE_TIMEOUT: Duration = Duration::from_millis(3000);

// Protocol constants, not user-configurable.
const AUDIO_ENCODING: &str = "linear16";
const SAMPLE_RATE: u32 = 16_000;
const CHANNELS: u32 = 1;
const ENDPOINTING_MS: u32 = 300;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

type ErrorCallback = Box<dyn Fn(SessionError) + Send + Sync>;

/// Lifecycle state of a [`StreamingSession`].
///
/// Audio may be submitted only in `Connecting`/`Streaming`; `Closed`
/// and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Streaming,
    Finalizing,
    Closed,
    Failed,
}

/// State shared between the session handle and its receive loop.
struct Shared {
    state: Mutex<SessionState>,
    /// Finalized segments in arrival order. The receive loop is the
    /// sole writer.
    segments: Mutex<Vec<String>>,
    /// Single-slot rendezvous for the finalize handshake. Resolving
    /// takes the sender out, so the ack path and the timeout path race
    /// safely: whichever loses finds the slot empty.
    finish_waiter: Mutex<Option<oneshot::Sender<()>>>,
    /// Invoked at most once, from the receive loop, on fatal transport
    /// failure.
    error_callback: Mutex<Option<ErrorCallback>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    fn resolve_finish_waiter(&self) {
        if let Some(waiter) = self.finish_waiter.lock().unwrap().take() {
            let _ = waiter.send(());
        }
    }

    fn report_error(&self, error: SessionError) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, SessionState::Closed | SessionState::Failed) {
                return;
            }
            *state = SessionState::Failed;
        }
        // Deliberately leaves any pending finish waiter untouched: a
        // transport error never resolves finish(), only its timeout.
        let callback = self.error_callback.lock().unwrap().take();
        if let Some(callback) = callback {
            callback(error);
        }
    }
}

/// One streaming transcription connection, scoped to a single utterance.
pub struct StreamingSession {
    shared: Arc<Shared>,
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingSession {
    /// Connect to the production recognition endpoint.
    pub async fn connect(credential: &str) -> Result<Self, SessionError> {
        Self::connect_to(STREAM_ENDPOINT, credential).await
    }

    /// Connect to an explicit endpoint (tests dial a loopback server).
    ///
    /// Fails synchronously on a bad credential or endpoint; there is no
    /// retry.
    pub async fn connect_to(endpoint: &str, credential: &str) -> Result<Self, SessionError> {
        if credential.trim().is_empty() {
            return Err(SessionError::InvalidCredential(
                "credential is empty".to_string(),
            ));
        }

        let url = build_stream_url(endpoint);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Token {}", credential)).map_err(|_| {
            SessionError::InvalidCredential("credential is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        debug!("Connecting to transcription endpoint: {}", endpoint);
        let (ws, _) = connect_async(request)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;
        let (sink, source) = ws.split();

        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Connecting),
            segments: Mutex::new(Vec::new()),
            finish_waiter: Mutex::new(None),
            error_callback: Mutex::new(None),
        });

        let receiver = tokio::spawn(receive_loop(shared.clone(), source));
        *shared.state.lock().unwrap() = SessionState::Streaming;
        info!("Streaming transcription session established");

        Ok(Self {
            shared,
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Register the fatal-transport-failure callback. Invoked at most
    /// once, from the receive loop.
    pub fn set_error_callback(&self, callback: impl Fn(SessionError) + Send + Sync + 'static) {
        *self.shared.error_callback.lock().unwrap() = Some(Box::new(callback));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Submit one raw PCM16 audio frame.
    ///
    /// No-op on empty input or outside Connecting/Streaming. A transport
    /// failure is logged and swallowed: the capture loop must never be
    /// interrupted by a send failure.
    pub async fn send_audio(&self, frame: &[u8]) {
        if frame.is_empty() {
            return;
        }
        match self.shared.state() {
            SessionState::Connecting | SessionState::Streaming => {}
            state => {
                debug!("Ignoring audio frame in {:?} state", state);
                return;
            }
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Binary(frame.to_vec().into())).await {
            warn!("Failed to send audio frame: {}", e);
        }
    }

    /// Run the finalize handshake and return the joined transcript.
    ///
    /// Sends one finalize control message, then waits until either the
    /// acknowledgement is observed or 3000 ms elapse, whichever comes
    /// first. Either way the transport is closed and the accumulated
    /// final segments are returned joined by single spaces, trimmed.
    pub async fn finish(&self) -> Result<String, SessionError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            match *state {
                SessionState::Connecting | SessionState::Streaming => {
                    *state = SessionState::Finalizing;
                }
                SessionState::Finalizing => {
                    return Err(SessionError::InvalidState("finish() already in progress"));
                }
                SessionState::Closed => {
                    return Err(SessionError::InvalidState("session is closed"));
                }
                SessionState::Failed => {
                    // The transport is gone; no acknowledgement can ever
                    // arrive. Return what accumulated before the failure.
                    drop(state);
                    return Ok(self.joined_transcript());
                }
            }
        }

        // Register the waiter before sending the request so an
        // immediate acknowledgement cannot slip past it.
        let (waiter_tx, waiter_rx) = oneshot::channel();
        *self.shared.finish_waiter.lock().unwrap() = Some(waiter_tx);

        {
            let request = serde_json::json!({ "type": FINALIZE_TYPE }).to_string();
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Text(request.into())).await {
                // The timeout below still bounds the wait.
                warn!("Failed to send finalize request: {}", e);
            }
        }

        match tokio::time::timeout(FINALIZE_TIMEOUT, waiter_rx).await {
            Ok(_) => debug!("Finalize acknowledged by remote"),
            Err(_) => {
                debug!(
                    "No finalize acknowledgement within {:?}, closing anyway",
                    FINALIZE_TIMEOUT
                );
                // Clear the slot so a late acknowledgement is a no-op.
                self.shared.finish_waiter.lock().unwrap().take();
            }
        }

        self.close_transport().await;
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state == SessionState::Finalizing {
                *state = SessionState::Closed;
            }
        }

        let transcript = self.joined_transcript();
        info!("Session finished, transcript: '{}'", transcript);
        Ok(transcript)
    }

    /// Abrupt teardown for error paths where `finish()` was never
    /// called. Cancels the transport immediately; waits for nothing.
    pub fn invalidate(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            if matches!(*state, SessionState::Closed | SessionState::Failed) {
                return;
            }
            *state = SessionState::Closed;
        }
        info!("Invalidating streaming session");

        if let Some(handle) = self.receiver.lock().unwrap().take() {
            handle.abort();
        }
        self.shared.segments.lock().unwrap().clear();

        let sink = self.sink.clone();
        tokio::spawn(async move {
            let _ = sink.lock().await.close().await;
        });
    }

    fn joined_transcript(&self) -> String {
        self.shared
            .segments
            .lock()
            .unwrap()
            .join(" ")
            .trim()
            .to_string()
    }

    async fn close_transport(&self) {
        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.close().await {
                debug!("Transport close: {}", e);
            }
        }
        if let Some(handle) = self.receiver.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Ok(mut receiver) = self.receiver.lock() {
            if let Some(handle) = receiver.take() {
                handle.abort();
            }
        }
    }
}

/// Append the fixed protocol constants as query parameters.
fn build_stream_url(endpoint: &str) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!(
        "{}{}encoding={}&sample_rate={}&channels={}&interim_results=true&punctuate=true&endpointing={}",
        endpoint, separator, AUDIO_ENCODING, SAMPLE_RATE, CHANNELS, ENDPOINTING_MS
    )
}

/// Drain the read half until the transport closes or fails.
///
/// Sole writer of the segment list. Malformed envelopes are dropped
/// without terminating the loop; a fatal transport error reports once
/// through the error callback and marks the session Failed.
async fn receive_loop(shared: Arc<Shared>, mut source: WsSource) {
    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let envelope: ResultEnvelope = match serde_json::from_str(text.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!("Dropping malformed result envelope: {}", e);
                        continue;
                    }
                };

                if envelope.is_final {
                    if let Some(transcript) = envelope.transcript() {
                        if !transcript.is_empty() {
                            debug!("Final segment: '{}'", transcript);
                            shared
                                .segments
                                .lock()
                                .unwrap()
                                .push(transcript.to_string());
                        }
                    }
                }

                if envelope.is_finalize_signal() {
                    debug!("Finalize signal observed");
                    shared.resolve_finish_waiter();
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Remote closed the transcription stream");
                break;
            }
            Ok(_) => {} // binary/ping/pong carry no results
            Err(e) => {
                warn!("Transport failure in receive loop: {}", e);
                shared.report_error(SessionError::Transport(e.to_string()));
                return;
            }
        }
    }

    let mut state = shared.state.lock().unwrap();
    if matches!(*state, SessionState::Connecting | SessionState::Streaming) {
        *state = SessionState::Closed;
    }
}

/// Inbound result envelope.
#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    channel: Option<ResultChannel>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    speech_final: bool,
}

#[derive(Debug, Deserialize)]
struct ResultChannel {
    #[serde(default)]
    alternatives: Vec<ResultAlternative>,
}

#[derive(Debug, Deserialize)]
struct ResultAlternative {
    #[serde(default)]
    transcript: String,
}

impl ResultEnvelope {
    fn transcript(&self) -> Option<&str> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.alternatives.first())
            .map(|alternative| alternative.transcript.as_str())
    }

    /// Both triggers are preserved on purpose: the explicit finalize
    /// marker, and `speech_final` on a final result.
    fn is_finalize_signal(&self) -> bool {
        self.kind.as_deref() == Some(FINALIZE_TYPE) || (self.speech_final && self.is_final)
    }
}

//! Real-time voice transcription pipeline.
//!
//! Two public surfaces:
//!
//! - [`StreamingSession`]: a persistent streaming connection to the
//!   remote speech-recognition service. Push captured audio in with
//!   [`StreamingSession::send_audio`]; call
//!   [`StreamingSession::finish`] to run the finalize handshake and get
//!   the joined transcript.
//! - [`NormalizationPipeline`]: a deterministic multi-stage
//!   text-normalization pipeline applied to the finalized transcript
//!   (filler removal, spoken-number conversion, dictionary correction,
//!   plus pluggable external stages).
//!
//! UI presentation, audio device capture, offline recognition, skill
//! discovery, secret storage and history persistence are external
//! collaborators; this crate only exposes the entry points they consume.

pub mod error;
pub mod normalize;
pub mod session;

pub use error::SessionError;
pub use normalize::{DictionaryEntry, NormalizationConfig, NormalizationPipeline, TextStage};
pub use session::{SessionState, StreamingSession, STREAM_ENDPOINT};

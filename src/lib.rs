/// Voice transcription service
///
/// Accepts short voice recordings from a Telegram bot and an HTTP upload
/// endpoint, normalizes them with ffmpeg, sends them to an external
/// speech-recognition backend, groups recognized digits into card-number
/// format and persists successful transcriptions to PostgreSQL.

pub mod api;
pub mod audio;
pub mod bot;
pub mod config;
pub mod digits;
pub mod pipeline;
pub mod recognition;
pub mod scratch;
pub mod storage;

// Re-export main types for easy access
pub use crate::audio::{AudioNormalizer, NormalizeError};
pub use crate::bot::VoiceBot;
pub use crate::config::Config;
pub use crate::digits::group_digits;
pub use crate::pipeline::{AudioBlob, Transcript, TranscriptPipeline};
pub use crate::recognition::{
    GoogleRecognizer, LanguageTag, RecognitionOutcome, SpeechRecognizer,
};
pub use crate::scratch::Scratch;
pub use crate::storage::{StorageError, TranscriptionRecord, TranscriptionStore};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::AudioNormalizer;
use crate::digits::group_digits;
use crate::recognition::{LanguageTag, RecognitionOutcome, SpeechRecognizer};
use crate::scratch::Scratch;

/// Raw audio handed over by a front-end, with the extension hint the
/// transcoder should assume for the container format.
#[derive(Debug, Clone)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, extension: &'static str) -> Self {
        Self { bytes, extension }
    }
}

/// Result of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    /// Recognition succeeded; the payload is the digit-grouped text.
    Recognized(String),
    /// Speech was present but the backend could not make it out.
    Unrecognized,
    /// The recognition backend erred or was unreachable.
    BackendUnavailable(String),
    /// Transcoding or another internal step failed.
    InternalError(String),
}

impl Transcript {
    /// The grouped text, present exactly when the invocation succeeded.
    /// Front-ends persist a record if and only if this is `Some`.
    pub fn recognized_text(&self) -> Option<&str> {
        match self {
            Self::Recognized(text) => Some(text),
            _ => None,
        }
    }
}

/// Drives one voice recording through normalization, recognition and digit
/// grouping. Transient files live in a per-invocation scratch namespace that
/// is released on every exit path.
pub struct TranscriptPipeline {
    normalizer: AudioNormalizer,
    recognizer: Arc<dyn SpeechRecognizer>,
    scratch_root: PathBuf,
}

impl TranscriptPipeline {
    pub fn new(
        normalizer: AudioNormalizer,
        recognizer: Arc<dyn SpeechRecognizer>,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            normalizer,
            recognizer,
            scratch_root,
        }
    }

    /// Run one invocation: stage the input, normalize, recognize, group.
    pub async fn transcribe(&self, blob: AudioBlob, language: LanguageTag) -> Transcript {
        let mut scratch = match Scratch::create(&self.scratch_root).await {
            Ok(scratch) => scratch,
            Err(e) => {
                warn!("Cannot allocate scratch space: {e}");
                return Transcript::InternalError(format!("scratch allocation failed: {e}"));
            }
        };

        // Release runs after the stages no matter how they came out;
        // Scratch's Drop covers unwinds.
        let outcome = self.run_stages(&scratch, blob, language).await;
        scratch.release().await;
        outcome
    }

    async fn run_stages(
        &self,
        scratch: &Scratch,
        blob: AudioBlob,
        language: LanguageTag,
    ) -> Transcript {
        let input = scratch.path(&format!("input.{}", blob.extension));
        if let Err(e) = tokio::fs::write(&input, &blob.bytes).await {
            return Transcript::InternalError(format!("cannot stage audio: {e}"));
        }

        let wav = scratch.path("audio.wav");
        if let Err(e) = self.normalizer.normalize(&input, &wav).await {
            warn!("Audio normalization failed: {e}");
            return Transcript::InternalError(e.to_string());
        }

        match self.recognizer.recognize(&wav, language).await {
            RecognitionOutcome::Text(raw) => {
                info!("Recognized text ({}): {} chars", language, raw.len());
                Transcript::Recognized(group_digits(&raw))
            }
            RecognitionOutcome::Unrecognized => {
                info!("Could not understand audio for language: {language}");
                Transcript::Unrecognized
            }
            RecognitionOutcome::Unavailable(detail) => Transcript::BackendUnavailable(detail),
            RecognitionOutcome::Failed(detail) => Transcript::InternalError(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_success_carries_text() {
        assert_eq!(
            Transcript::Recognized("1234".to_string()).recognized_text(),
            Some("1234")
        );
        assert_eq!(Transcript::Unrecognized.recognized_text(), None);
        assert_eq!(
            Transcript::BackendUnavailable("down".to_string()).recognized_text(),
            None
        );
        assert_eq!(
            Transcript::InternalError("boom".to_string()).recognized_text(),
            None
        );
    }
}

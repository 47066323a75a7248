use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::RecognitionConfig;

/// Locale selection for the recognition backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageTag {
    Uzbek,
    Russian,
}

impl LanguageTag {
    /// Locale code the recognition backend expects.
    pub fn locale(self) -> &'static str {
        match self {
            Self::Uzbek => "uz_UZ",
            Self::Russian => "ru_RU",
        }
    }

    /// Parse the HTTP form value.
    pub fn from_locale(value: &str) -> Option<Self> {
        match value {
            "uz_UZ" => Some(Self::Uzbek),
            "ru_RU" => Some(Self::Russian),
            _ => None,
        }
    }

    /// Parse the bot's inline-keyboard callback data.
    pub fn from_callback(data: &str) -> Option<Self> {
        match data {
            "uzbek" => Some(Self::Uzbek),
            "russian" => Some(Self::Russian),
            _ => None,
        }
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.locale())
    }
}

/// Outcome of a single recognition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Raw recognized text as returned by the backend.
    Text(String),
    /// The backend answered but could not make out any speech.
    Unrecognized,
    /// The backend erred or could not be reached (includes timeouts).
    Unavailable(String),
    /// Unexpected local fault or malformed backend response.
    Failed(String),
}

/// Speech-recognition backend seam.
///
/// The production implementation calls the Google Speech API; tests
/// substitute stubs. One call makes exactly one recognition attempt;
/// retries belong to the caller.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, wav: &Path, language: LanguageTag) -> RecognitionOutcome;
}

/// Google Speech API v2 client.
pub struct GoogleRecognizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sample_rate: u32,
}

impl GoogleRecognizer {
    pub fn new(config: &RecognitionConfig, sample_rate: u32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            sample_rate,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for GoogleRecognizer {
    async fn recognize(&self, wav: &Path, language: LanguageTag) -> RecognitionOutcome {
        let wav_bytes = match tokio::fs::read(wav).await {
            Ok(bytes) => bytes,
            Err(e) => return RecognitionOutcome::Failed(format!("cannot read waveform: {e}")),
        };

        let pcm = match pcm_payload(&wav_bytes) {
            Ok(payload) => payload.to_vec(),
            Err(e) => return RecognitionOutcome::Failed(format!("bad waveform: {e}")),
        };

        debug!(
            "Submitting {} bytes of PCM for {} recognition",
            pcm.len(),
            language.locale()
        );

        let url = format!(
            "{}?client=chromium&lang={}&key={}",
            self.endpoint,
            language.locale(),
            self.api_key
        );

        let response = match self
            .client
            .post(&url)
            .header(
                "Content-Type",
                format!("audio/l16; rate={}; channels=1", self.sample_rate),
            )
            .body(pcm)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Recognition request failed: {e}");
                return RecognitionOutcome::Unavailable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Recognition API error: status={status}, body={body}");
            return RecognitionOutcome::Unavailable(format!("recognition API returned {status}"));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return RecognitionOutcome::Failed(format!("cannot read recognition response: {e}"))
            }
        };

        match parse_transcript(&body) {
            Some(text) => {
                debug!("Recognized {} chars of {} speech", text.len(), language);
                RecognitionOutcome::Text(text)
            }
            None => RecognitionOutcome::Unrecognized,
        }
    }
}

/// Extract the PCM payload (the `data` chunk) of a RIFF/WAVE file.
fn pcm_payload(wav: &[u8]) -> Result<&[u8], String> {
    if wav.len() < 12 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
        return Err("not a RIFF/WAVE file".to_string());
    }

    let mut pos = 12;
    while pos + 8 <= wav.len() {
        let id = &wav[pos..pos + 4];
        let size =
            u32::from_le_bytes([wav[pos + 4], wav[pos + 5], wav[pos + 6], wav[pos + 7]]) as usize;
        let body = pos + 8;
        if id == b"data" {
            let end = (body + size).min(wav.len());
            return Ok(&wav[body..end]);
        }
        // chunks are word-aligned
        pos = body + size + (size & 1);
    }

    Err("no data chunk".to_string())
}

/// Parse the API's JSON-lines body. The first line carrying a non-empty
/// `result` array holds the transcript; an empty result set means the
/// backend could not make out any speech.
fn parse_transcript(body: &str) -> Option<String> {
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        let Some(results) = value.get("result").and_then(Value::as_array) else {
            continue;
        };

        let transcript = results
            .iter()
            .filter_map(|result| result.get("alternative").and_then(Value::as_array))
            .flat_map(|alternatives| alternatives.iter())
            .filter_map(|alternative| alternative.get("transcript").and_then(Value::as_str))
            .next();

        if let Some(transcript) = transcript {
            return Some(transcript.to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_codes() {
        assert_eq!(LanguageTag::Uzbek.locale(), "uz_UZ");
        assert_eq!(LanguageTag::Russian.locale(), "ru_RU");
    }

    #[test]
    fn parses_form_values() {
        assert_eq!(LanguageTag::from_locale("uz_UZ"), Some(LanguageTag::Uzbek));
        assert_eq!(
            LanguageTag::from_locale("ru_RU"),
            Some(LanguageTag::Russian)
        );
        assert_eq!(LanguageTag::from_locale("en_US"), None);
    }

    #[test]
    fn parses_callback_data() {
        assert_eq!(
            LanguageTag::from_callback("uzbek"),
            Some(LanguageTag::Uzbek)
        );
        assert_eq!(
            LanguageTag::from_callback("russian"),
            Some(LanguageTag::Russian)
        );
        assert_eq!(LanguageTag::from_callback("french"), None);
    }

    #[test]
    fn transcript_skips_empty_result_line() {
        let body = concat!(
            "{\"result\":[]}\n",
            "{\"result\":[{\"alternative\":[{\"transcript\":\"9860 1234\",\"confidence\":0.9}],\"final\":true}],\"result_index\":0}\n",
        );
        assert_eq!(parse_transcript(body), Some("9860 1234".to_string()));
    }

    #[test]
    fn empty_result_set_means_unrecognized() {
        assert_eq!(parse_transcript("{\"result\":[]}\n"), None);
        assert_eq!(parse_transcript(""), None);
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let body = "not-json\n{\"result\":[{\"alternative\":[{\"transcript\":\"ok\"}]}]}\n";
        assert_eq!(parse_transcript(body), Some("ok".to_string()));
    }

    fn minimal_wav(payload: &[u8]) -> Vec<u8> {
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&((36 + payload.len()) as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&[0u8; 16]);
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        wav.extend_from_slice(payload);
        wav
    }

    #[test]
    fn pcm_payload_finds_data_chunk() {
        let wav = minimal_wav(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(pcm_payload(&wav).unwrap(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn pcm_payload_rejects_non_wav() {
        assert!(pcm_payload(b"OggS....junk").is_err());
        assert!(pcm_payload(b"").is_err());
    }

    #[test]
    fn pcm_payload_rejects_wav_without_data() {
        let mut wav = minimal_wav(&[]);
        wav.truncate(36); // cut off before the data chunk header
        assert!(pcm_payload(&wav).is_err());
    }
}

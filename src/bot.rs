//! Telegram front-end: long-polls the Bot API and drives voice messages
//! through the transcript pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::pipeline::{AudioBlob, Transcript, TranscriptPipeline};
use crate::recognition::LanguageTag;
use crate::storage::{TranscriptionRecord, TranscriptionStore};

const GREETING: &str = "Salom! Menga Uzbek, Rus tillarida ovozli xabar yuboring. \
Men uni matn qilib beraman.\n\
Здравствуйте! Отправьте мне голосовое сообщение на узбекском и русском языках. \
Я преобразую его в текст.";
const CHOOSE_LANGUAGE: &str = "Tilni tanlang:";
const FILE_TOO_LARGE: &str = "Fayl hajmi juda katta.";
const NOT_RECOGNIZED: &str = "Matnni tanib bo'lmadi.";
const DOWNLOAD_FAILED: &str = "Faylni yuklab bo'lmadi.";
const NO_PENDING_VOICE: &str = "Avval ovozli xabar yuboring.";

/// A downloaded voice message waiting for its language choice.
struct PendingVoice {
    bytes: Vec<u8>,
}

/// A parsed `callback_query` update (inline-keyboard click).
#[derive(Debug, Clone, PartialEq)]
struct CallbackChoice {
    id: String,
    chat_id: i64,
    user_id: i64,
    username: Option<String>,
    data: String,
}

/// Telegram front-end that long-polls the Bot API for updates.
pub struct VoiceBot {
    token: String,
    client: reqwest::Client,
    pipeline: Arc<TranscriptPipeline>,
    store: Option<Arc<TranscriptionStore>>,
    max_voice_bytes: u64,
    poll_timeout: Duration,
    /// Voice bytes held per chat until the user picks a language.
    pending: Mutex<HashMap<i64, PendingVoice>>,
}

impl VoiceBot {
    pub fn new(
        config: &TelegramConfig,
        pipeline: Arc<TranscriptPipeline>,
        store: Option<Arc<TranscriptionStore>>,
    ) -> Self {
        // The client timeout has to outlast a full long-poll cycle.
        let poll_timeout = Duration::from_secs(config.poll_timeout_seconds);
        Self {
            token: config.bot_token.clone(),
            client: reqwest::Client::builder()
                .timeout(poll_timeout + Duration::from_secs(10))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            pipeline,
            store,
            max_voice_bytes: config.max_voice_bytes,
            poll_timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{method}", self.token)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.token, file_path
        )
    }

    async fn api_call(&self, method: &str, body: Value) -> anyhow::Result<Value> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram {method} failed: {err}");
        }

        Ok(resp.json().await?)
    }

    async fn send_message(&self, chat_id: i64, text: &str) {
        let body = json!({ "chat_id": chat_id, "text": text });
        if let Err(e) = self.api_call("sendMessage", body).await {
            warn!("Failed to send message to {chat_id}: {e}");
        }
    }

    /// Two discrete language options under the "choose a language" prompt.
    async fn send_language_keyboard(&self, chat_id: i64) {
        let body = json!({
            "chat_id": chat_id,
            "text": CHOOSE_LANGUAGE,
            "reply_markup": {
                "inline_keyboard": [
                    [{ "text": "🇺🇿 Oʻzbekcha", "callback_data": "uzbek" }],
                    [{ "text": "🇷🇺 Русский", "callback_data": "russian" }]
                ]
            }
        });
        if let Err(e) = self.api_call("sendMessage", body).await {
            warn!("Failed to send language keyboard to {chat_id}: {e}");
        }
    }

    /// Acknowledge a button click so the client stops its loading spinner.
    async fn answer_callback(&self, callback_id: &str) {
        let body = json!({ "callback_query_id": callback_id });
        if let Err(e) = self.api_call("answerCallbackQuery", body).await {
            debug!("Failed to answer callback query {callback_id}: {e}");
        }
    }

    /// Register the command list shown in the Telegram client.
    async fn set_commands(&self) -> anyhow::Result<()> {
        let body = json!({
            "commands": [
                { "command": "start", "description": "Botni ishga tushirish" }
            ]
        });
        self.api_call("setMyCommands", body).await?;
        Ok(())
    }

    /// Download a file from Telegram by its `file_id`: resolve the path via
    /// getFile, then fetch the bytes from the file endpoint.
    async fn download_file(&self, file_id: &str) -> anyhow::Result<Vec<u8>> {
        let data = self
            .api_call("getFile", json!({ "file_id": file_id }))
            .await?;

        let file_path = data
            .get("result")
            .and_then(|r| r.get("file_path"))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("Missing file_path in getFile response"))?;

        let resp = self.client.get(self.file_url(file_path)).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("Failed to download file from Telegram: {}", resp.status());
        }

        Ok(resp.bytes().await?.to_vec())
    }

    /// Poll loop. Runs until the process exits.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        if let Err(e) = self.set_commands().await {
            warn!("Failed to register bot commands: {e}");
        }

        info!("🤖 Telegram bot polling for updates...");
        let mut offset: i64 = 0;

        loop {
            let body = json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"]
            });

            let data = match self.api_call("getUpdates", body).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Telegram poll error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            };

            if let Some(updates) = data.get("result").and_then(Value::as_array) {
                for update in updates {
                    if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                        offset = update_id + 1;
                    }
                    Arc::clone(&self).handle_update(update).await;
                }
            }
        }
    }

    async fn handle_update(self: Arc<Self>, update: &Value) {
        if let Some(callback) = update.get("callback_query") {
            self.handle_callback(callback).await;
            return;
        }

        let Some(message) = update.get("message") else {
            return;
        };
        let Some(chat_id) = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)
        else {
            return;
        };

        if message.get("text").and_then(Value::as_str) == Some("/start") {
            self.send_message(chat_id, GREETING).await;
            return;
        }

        if let Some(voice) = message.get("voice") {
            self.handle_voice(chat_id, voice).await;
        }
    }

    /// A voice message arrived: enforce the size gate, download the bytes and
    /// ask for the language.
    async fn handle_voice(&self, chat_id: i64, voice: &Value) {
        info!("Voice message received in chat {chat_id}");

        let file_size = voice.get("file_size").and_then(Value::as_u64).unwrap_or(0);
        if file_size >= self.max_voice_bytes {
            // rejected on the declared size, before any download
            info!("Rejecting oversized voice message: {file_size} bytes");
            self.send_message(chat_id, FILE_TOO_LARGE).await;
            return;
        }

        let Some(file_id) = voice.get("file_id").and_then(Value::as_str) else {
            warn!("Voice message missing file_id");
            return;
        };

        match self.download_file(file_id).await {
            Ok(bytes) => {
                self.pending
                    .lock()
                    .await
                    .insert(chat_id, PendingVoice { bytes });
                self.send_language_keyboard(chat_id).await;
            }
            Err(e) => {
                error!("Failed to download voice: {e}");
                self.send_message(chat_id, DOWNLOAD_FAILED).await;
            }
        }
    }

    /// The user picked a language: take the pending voice and run it through
    /// the pipeline in its own task, so one recognition never stalls the
    /// poll loop or other chats.
    async fn handle_callback(self: Arc<Self>, callback: &Value) {
        let Some(choice) = parse_callback_query(callback) else {
            debug!("Ignoring malformed callback query");
            return;
        };

        self.answer_callback(&choice.id).await;

        let Some(language) = LanguageTag::from_callback(&choice.data) else {
            debug!("Ignoring callback with unknown data: {}", choice.data);
            return;
        };

        let pending = self.pending.lock().await.remove(&choice.chat_id);
        let Some(voice) = pending else {
            self.send_message(choice.chat_id, NO_PENDING_VOICE).await;
            return;
        };

        let bot = Arc::clone(&self);
        tokio::spawn(async move {
            bot.process_voice(choice, language, voice.bytes).await;
        });
    }

    async fn process_voice(&self, choice: CallbackChoice, language: LanguageTag, bytes: Vec<u8>) {
        info!("Starting recognition for language: {language}");

        let transcript = self
            .pipeline
            .transcribe(AudioBlob::new(bytes, "ogg"), language)
            .await;

        match &transcript {
            Transcript::Recognized(text) => {
                let reply = if text.is_empty() {
                    NOT_RECOGNIZED
                } else {
                    text.as_str()
                };
                self.send_message(choice.chat_id, reply).await;

                if let Some(store) = &self.store {
                    store
                        .record_best_effort(&TranscriptionRecord {
                            user_id: choice.user_id,
                            username: choice.username,
                            language,
                            text: text.clone(),
                        })
                        .await;
                }
            }
            Transcript::Unrecognized => {
                self.send_message(choice.chat_id, NOT_RECOGNIZED).await;
            }
            Transcript::BackendUnavailable(detail) => {
                warn!("Recognition backend unavailable: {detail}");
                self.send_message(choice.chat_id, NOT_RECOGNIZED).await;
            }
            Transcript::InternalError(detail) => {
                error!("Transcription failed: {detail}");
                self.send_message(choice.chat_id, NOT_RECOGNIZED).await;
            }
        }
    }
}

fn parse_callback_query(callback: &Value) -> Option<CallbackChoice> {
    let id = callback.get("id")?.as_str()?.to_string();
    let data = callback.get("data")?.as_str()?.to_string();

    let from = callback.get("from")?;
    let user_id = from.get("id")?.as_i64()?;
    let username = from
        .get("username")
        .and_then(Value::as_str)
        .map(String::from);

    let chat_id = callback
        .get("message")?
        .get("chat")?
        .get("id")?
        .as_i64()?;

    Some(CallbackChoice {
        id,
        chat_id,
        user_id,
        username,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioNormalizer;
    use crate::config::AudioConfig;
    use crate::recognition::RecognitionOutcome;
    use crate::recognition::SpeechRecognizer;
    use async_trait::async_trait;
    use std::path::Path;

    struct NoopRecognizer;

    #[async_trait]
    impl SpeechRecognizer for NoopRecognizer {
        async fn recognize(&self, _wav: &Path, _language: LanguageTag) -> RecognitionOutcome {
            RecognitionOutcome::Unrecognized
        }
    }

    fn test_bot(token: &str) -> VoiceBot {
        let config = TelegramConfig {
            bot_token: token.to_string(),
            ..TelegramConfig::default()
        };
        let pipeline = Arc::new(TranscriptPipeline::new(
            AudioNormalizer::new(&AudioConfig::default()),
            Arc::new(NoopRecognizer),
            std::env::temp_dir().join("ovoz-bot-tests"),
        ));
        VoiceBot::new(&config, pipeline, None)
    }

    #[test]
    fn bot_api_url() {
        let bot = test_bot("123:ABC");
        assert_eq!(
            bot.api_url("getUpdates"),
            "https://api.telegram.org/bot123:ABC/getUpdates"
        );
    }

    #[test]
    fn bot_file_url() {
        let bot = test_bot("123:ABC");
        assert_eq!(
            bot.file_url("voice/file_7.oga"),
            "https://api.telegram.org/file/bot123:ABC/voice/file_7.oga"
        );
    }

    #[test]
    fn parse_callback_query_valid() {
        let callback = json!({
            "id": "cb-42",
            "from": { "id": 777000, "username": "shahzod" },
            "message": { "message_id": 5, "chat": { "id": 424242 } },
            "data": "uzbek"
        });

        let choice = parse_callback_query(&callback).unwrap();
        assert_eq!(choice.id, "cb-42");
        assert_eq!(choice.user_id, 777000);
        assert_eq!(choice.username.as_deref(), Some("shahzod"));
        assert_eq!(choice.chat_id, 424242);
        assert_eq!(choice.data, "uzbek");
    }

    #[test]
    fn parse_callback_query_without_username() {
        let callback = json!({
            "id": "cb-43",
            "from": { "id": 1 },
            "message": { "chat": { "id": 2 } },
            "data": "russian"
        });

        let choice = parse_callback_query(&callback).unwrap();
        assert!(choice.username.is_none());
        assert_eq!(
            LanguageTag::from_callback(&choice.data),
            Some(LanguageTag::Russian)
        );
    }

    #[test]
    fn parse_callback_query_missing_fields() {
        let callback = json!({ "id": "cb-44" });
        assert!(parse_callback_query(&callback).is_none());
    }

    #[tokio::test]
    async fn oversized_voice_leaves_no_pending_entry() {
        let bot = test_bot("t");
        let voice = json!({ "file_id": "f1", "file_size": 800_000 });

        // send_message will fail against the fake token, which is fine; the
        // gate must fire before any download or pending insert.
        bot.handle_voice(1, &voice).await;
        assert!(bot.pending.lock().await.is_empty());
    }

    #[test]
    fn size_gate_is_inclusive() {
        let bot = test_bot("t");
        assert!(715_000 >= bot.max_voice_bytes);
        assert!(714_999 < bot.max_voice_bytes);
    }
}

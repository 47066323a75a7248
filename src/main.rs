use anyhow::Result;
use clap::{Arg, Command};
use std::sync::Arc;
use tracing::{error, info, warn};

use ovoz::api::{start_http_server, AppState};
use ovoz::audio::AudioNormalizer;
use ovoz::bot::VoiceBot;
use ovoz::config::Config;
use ovoz::pipeline::TranscriptPipeline;
use ovoz::recognition::GoogleRecognizer;
use ovoz::storage::TranscriptionStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("ovoz=info,warn")
        .init();

    let matches = Command::new("ovoz")
        .version("0.1.0")
        .about("Voice-to-text transcription service (Telegram bot + HTTP API)")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("HTTP port (overrides configuration)"),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(port) = matches.get_one::<String>("port") {
        config.server.port = port.parse()?;
    }
    config.validate()?;

    info!("🚀 ovoz starting...");
    info!("📂 Scratch root: {}", config.audio.scratch_dir.display());
    info!("🌐 HTTP port: {}", config.server.port);

    // The transcoder is the one hard external dependency; fail fast when the
    // binary itself is missing instead of erroring on every request.
    let normalizer = AudioNormalizer::new(&config.audio);
    if let Err(e) = normalizer.ensure_available().await {
        error!("Transcoder health check failed: {e}");
        return Err(e.into());
    }

    let store = match TranscriptionStore::connect_lazy(&config.database) {
        Ok(store) => {
            if let Err(e) = store.init_schema().await {
                warn!("Database not ready, transcriptions are not persisted until it is: {e}");
            }
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!("Invalid database configuration, persistence disabled: {e}");
            None
        }
    };

    let recognizer = Arc::new(GoogleRecognizer::new(
        &config.recognition,
        config.audio.target_sample_rate,
    ));
    let pipeline = Arc::new(TranscriptPipeline::new(
        normalizer,
        recognizer,
        config.audio.scratch_dir.clone(),
    ));

    let state = AppState {
        pipeline: Arc::clone(&pipeline),
    };

    if config.telegram.bot_token.is_empty() {
        warn!("BOT_TOKEN not set, running the HTTP front-end only");
        start_http_server(state, &config).await
    } else {
        let bot = Arc::new(VoiceBot::new(&config.telegram, pipeline, store));
        tokio::select! {
            result = start_http_server(state, &config) => result,
            result = bot.run() => result,
        }
    }
}

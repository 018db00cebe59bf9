use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use jarvis_voice::state::LogEntry;
use jarvis_voice::voice::{
    AudioCapture, AudioPlayback, AudioSink, CHIME_SAMPLE_RATE, CaptureSettings, CloudVoice,
    EspeakPlayer, MicrophoneSource, SpeechCapture, SpeechOutput, SpeechToText, TranscriptSource,
    VoiceMeter, WakeWordGate, activation_chime, calculate_energy,
};
use jarvis_voice::{Config, Orchestrator, ResponseClient, Store};

/// Jarvis - voice-activated conversational assistant
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable microphone capture (typed commands only)
    #[arg(long, env = "JARVIS_NO_MIC")]
    no_mic: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Play the activation chime
    TestSpeaker,
    /// Speak text through the configured voices
    TestTts {
        /// Text to speak
        #[arg(default_value = "Olá! Este é um teste do sistema de voz.")]
        text: String,
    },
    /// Print the stored conversation log
    History,
    /// Remove the stored log and chat history
    ClearHistory,
    /// Run one typed turn and exit
    Say {
        /// Command text
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,jarvis_voice=info",
        1 => "info,jarvis_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
            Command::History => cmd_history(),
            Command::ClearHistory => cmd_clear_history(),
            Command::Say { text } => cmd_say(&text).await,
        };
    }

    let config = Config::load_with_options(cli.no_mic)?;
    tracing::debug!(?config, "loaded configuration");

    let orchestrator = build_orchestrator(&config, true)?;
    let handle = orchestrator.handle();

    for entry in orchestrator.logs() {
        println!("{}", render_line(entry));
    }
    spawn_log_printer(orchestrator.subscribe_logs());

    // Terminal input: every line is a typed command
    let input = handle.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            input.submit_text(line);
        }
        tracing::debug!("stdin closed");
    });

    let signal = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.shutdown();
        }
    });

    tracing::info!(
        "jarvis ready - say \"{}\" or type a command",
        config.wake_word
    );
    orchestrator.run().await?;

    Ok(())
}

/// Wire the orchestrator from configuration
fn build_orchestrator(config: &Config, with_capture: bool) -> anyhow::Result<Orchestrator> {
    let store = Store::open(config.store_path())?.with_wake_word(&config.wake_word);
    let gate = WakeWordGate::new(&config.wake_word)?;
    let chat = ResponseClient::new(&config.chat);
    let meter = VoiceMeter::new();

    let sink: Option<Arc<dyn AudioSink>> = match AudioPlayback::new() {
        Ok(playback) => Some(Arc::new(playback)),
        Err(e) => {
            tracing::warn!(error = %e, "no audio output, cloud voice and chime disabled");
            None
        }
    };

    let speech = build_speech(config, meter.clone(), sink.clone());
    let source = if with_capture {
        build_source(config)
    } else {
        None
    };
    let capture = SpeechCapture::new(
        source,
        CaptureSettings::continuous(config.language.as_str()),
        meter,
    );

    let orchestrator = Orchestrator::new(gate, store, chat, speech, capture);
    Ok(match sink {
        Some(sink) => orchestrator.with_chime(sink),
        None => orchestrator,
    })
}

fn build_speech(config: &Config, meter: VoiceMeter, sink: Option<Arc<dyn AudioSink>>) -> SpeechOutput {
    let mut speech = SpeechOutput::new(config.language.as_str(), meter);

    if let Some(sink) = sink {
        if let Some(cloud) = CloudVoice::from_config(&config.speech) {
            tracing::info!(model = %config.speech.model_id, "cloud voice enabled");
            speech = speech.with_cloud(cloud).with_sink(sink);
        }
    }

    match EspeakPlayer::locate(&config.language) {
        Ok(player) => speech.with_local(Arc::new(player)),
        Err(e) => {
            tracing::warn!(error = %e, "on-device synthesis unavailable");
            speech
        }
    }
}

fn build_source(config: &Config) -> Option<Box<dyn TranscriptSource>> {
    if !config.capture.enabled {
        return None;
    }

    let Some(key) = &config.capture.stt_api_key else {
        tracing::warn!(provider = ?config.capture.stt_provider, "no STT API key, microphone disabled");
        return None;
    };

    match SpeechToText::new(
        config.capture.stt_provider,
        key.expose_secret().to_owned(),
        config.capture.stt_model.clone(),
        config.language.clone(),
    ) {
        Ok(stt) => Some(Box::new(MicrophoneSource::new(stt, config.capture.session_timeout))),
        Err(e) => {
            tracing::warn!(error = %e, "failed to create STT client");
            None
        }
    }
}

fn spawn_log_printer(mut rx: broadcast::Receiver<LogEntry>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(entry) => println!("{}", render_line(&entry)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "log printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// `[HH:MM:SS] [SYS] text`
fn render_line(entry: &LogEntry) -> String {
    format!(
        "[{}] [{}] {}",
        entry.timestamp.with_timezone(&chrono::Local).format("%H:%M:%S"),
        entry.category.label(),
        entry.text
    )
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open()?;
    capture.start(|e| tracing::warn!(error = %e, "input stream error"))?;
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Play the activation chime
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear the activation chime\n");

    let playback = AudioPlayback::new()?;
    println!("Device: {}", playback.device_name());

    let samples = activation_chime(CHIME_SAMPLE_RATE);
    println!("Playing {} samples at {} Hz...", samples.len(), CHIME_SAMPLE_RATE);
    playback.play_samples(samples, CHIME_SAMPLE_RATE).await?;

    println!("\n---");
    println!("If you heard the chime, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Speak text through the configured voices
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load()?;
    let sink: Option<Arc<dyn AudioSink>> = AudioPlayback::new()
        .ok()
        .map(|p| Arc::new(p) as Arc<dyn AudioSink>);
    let speech = build_speech(&config, VoiceMeter::new(), sink);

    let backend = speech.speak(text).await?;
    println!("Spoken via {backend:?}");

    Ok(())
}

/// Print the stored conversation log
fn cmd_history() -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = Store::open(config.store_path())?.with_wake_word(&config.wake_word);

    for entry in store.load_logs() {
        println!("{}", render_line(&entry));
    }
    println!("({} messages in chat history)", store.load_messages().len());

    Ok(())
}

/// Remove the stored log and chat history
fn cmd_clear_history() -> anyhow::Result<()> {
    let config = Config::load()?;
    let store = Store::open(config.store_path())?;
    store.clear()?;

    println!("Conversation history cleared.");
    Ok(())
}

/// Run one typed turn without the microphone
async fn cmd_say(text: &str) -> anyhow::Result<()> {
    let config = Config::load_with_options(true)?;
    let mut orchestrator = build_orchestrator(&config, false)?;
    spawn_log_printer(orchestrator.subscribe_logs());

    orchestrator.run_turn(text).await?;

    // Let the printer drain the last entries
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}

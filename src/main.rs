use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_call::capability::{MicrophoneProvider, SynthesisEngine};
use beacon_call::events::{Command, EngineEvent, EventSink, SynthesisEvent, UtteranceId};
use beacon_call::voice::{self, CloudSpeaker, CpalMicrophone, TextToSpeech};
use beacon_call::{CallOrchestrator, Config, HttpRemoteService, TerminalPresenter};

/// Beacon call - chat and voice calling with a remote assistant
#[derive(Parser)]
#[command(name = "beacon-call", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (text chat only)
    #[arg(long, env = "BEACON_CALL_DISABLE_VOICE")]
    disable_voice: bool,

    /// Assistant service URL (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_call=info",
        1 => "info,beacon_call=debug",
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

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.disable_voice)?;
    if let Some(endpoint) = cli.endpoint {
        config = config.with_endpoint(endpoint)?;
    }

    if let Some(cmd) = cli.command {
        return match cmd {
            CliCommand::TestMic { duration } => test_mic(duration).await,
            CliCommand::TestTts { text } => test_tts(&config, &text).await,
        };
    }

    tracing::info!(
        endpoint = %config.api_endpoint,
        api_key = config.api_key_mode(),
        voice = config.voice.enabled,
        "starting beacon call"
    );

    let remote = Arc::new(HttpRemoteService::from_config(&config));
    let capabilities = voice::desktop_capabilities(&config.voice, remote);
    let presenter = Box::new(TerminalPresenter::stdout(config.theme));
    let mut orchestrator = CallOrchestrator::new(&config, capabilities, presenter);

    let (tx, rx) = mpsc::channel(32);
    spawn_stdin_reader(tx.clone());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = tx.send(Command::Shutdown).await;
        }
    });

    println!("Commands: /call  /end  /mute  /persist  /quit");
    orchestrator.run(rx).await;

    Ok(())
}

/// Read operator input on a plain thread so a pending read never holds up exit
fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    let Some(command) = parse_input(&line) else {
                        continue;
                    };
                    if tx.blocking_send(command).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
        let _ = tx.blocking_send(Command::Shutdown);
    });
}

/// Map one input line to a widget command
fn parse_input(line: &str) -> Option<Command> {
    let line = line.trim();
    match line {
        "" => None,
        "/call" => Some(Command::StartCall),
        "/end" => Some(Command::EndCall),
        "/mute" => Some(Command::ToggleRecording),
        "/persist" => Some(Command::TogglePersistentMode),
        "/quit" | "/exit" => Some(Command::Shutdown),
        text => Some(Command::SendText(text.to_string())),
    }
}

#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let handle = CpalMicrophone::new().request_access().await?;

    println!("Sample rate: {} Hz", voice::SAMPLE_RATE);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = handle.tap().take();
        let energy = voice::rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    handle.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.voice)?;
    let mut speaker = CloudSpeaker::new(tts);
    let (sink, mut events) = EventSink::channel();

    println!("Synthesizing and playing...");
    speaker.speak(text, sink.synthesis(UtteranceId(1)))?;

    match events.recv().await {
        Some(EngineEvent::Synthesis {
            event: SynthesisEvent::Finished,
            ..
        }) => {
            println!("\n---");
            println!("If you heard the speech, TTS is working!");
            Ok(())
        }
        Some(EngineEvent::Synthesis {
            event: SynthesisEvent::Failed(reason),
            ..
        }) => anyhow::bail!("TTS failed: {reason}"),
        other => anyhow::bail!("unexpected event: {other:?}"),
    }
}

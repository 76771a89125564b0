use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};

use trivia_voice::voice::{
    AudioBuffer, AudioCapture, AudioPlayback, AudioSink, Direction, Recorder, Selection, rms,
    segment,
};
use trivia_voice::{Config, Diagnostics, Error, Registry, SpeechIo};

/// Trivia Voice - spoken trivia over interchangeable speech providers
#[derive(Parser)]
#[command(name = "trivia-voice", version, about)]
struct Cli {
    /// Config file (default: ~/.config/trivia-voice/config.toml)
    #[arg(short, long, env = "TRIVIA_VOICE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Alternate spoken assistant lines with spoken or typed replies
    Converse,
    /// Speak text through the configured provider
    Speak {
        /// Text to speak
        text: String,
    },
    /// Capture and print one spoken reply
    Listen,
    /// Show provider availability and selection
    Providers,
    /// Show how text would be split for synthesis
    Segment {
        /// Text to split
        text: String,
        /// Maximum segment length in characters
        #[arg(long, default_value = "150")]
        max_len: usize,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref());
    let level = config.as_ref().map_or("info", |c| c.log_level.as_str());
    let _diagnostics = Diagnostics::init(level, cli.verbose);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("fatal: {e}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(source = ?config.source, "loaded configuration");

    match run(cli.command.unwrap_or(Command::Converse), &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Converse => converse(config).await,
        Command::Speak { text } => speak(config, &text).await,
        Command::Listen => listen(config).await,
        Command::Providers => providers(config),
        Command::Segment { text, max_len } => {
            print_segments(&text, max_len);
            Ok(())
        }
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// The conversation loop
#[allow(clippy::future_not_send)]
async fn converse(config: &Config) -> anyhow::Result<()> {
    let mut io = SpeechIo::from_config(config)?;

    println!("Enter each assistant line to have it spoken. An empty line ends the session.");
    if io.using_stt() {
        println!("Replies are spoken; each one is confirmed before it is used.");
    } else {
        println!("Speech input is unavailable; type your replies.");
    }

    loop {
        let Some(line) = prompt_line("assistant").await? else {
            break;
        };
        if line.trim().is_empty() {
            break;
        }

        if !io.speak(&line).await {
            tracing::warn!("could not speak the assistant line");
        }

        let reply = if io.using_stt() {
            spoken_reply(&mut io).await?
        } else {
            prompt_line("you").await?
        };
        let Some(reply) = reply else {
            break;
        };
        println!("you> {reply}");
    }

    println!("Goodbye!");
    Ok(())
}

/// Listen until the user accepts a transcription or interrupts
#[allow(clippy::future_not_send)]
async fn spoken_reply(io: &mut SpeechIo) -> anyhow::Result<Option<String>> {
    loop {
        match io.listener_mut().listen(ctrl_c()).await {
            Ok(text) => {
                println!("Heard: {text}");
                let accepted = tokio::task::spawn_blocking(|| {
                    Confirm::new()
                        .with_prompt("Is that acceptable?")
                        .default(true)
                        .interact()
                })
                .await??;
                if accepted {
                    return Ok(Some(text));
                }
            }
            Err(Error::Interrupted) => return Ok(None),
            Err(Error::NoSpeechDetected) => println!("Didn't catch that, try again."),
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                println!("Recognition failed, try again.");
            }
        }
    }
}

/// Read one line, or `None` on Ctrl+C
async fn prompt_line(prompt: &'static str) -> anyhow::Result<Option<String>> {
    let read = tokio::task::spawn_blocking(move || {
        Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    });

    tokio::select! {
        line = read => Ok(Some(line??)),
        () = ctrl_c() => Ok(None),
    }
}

#[allow(clippy::future_not_send)]
async fn speak(config: &Config, text: &str) -> anyhow::Result<()> {
    let io = SpeechIo::from_config(config)?;
    if !io.speak(text).await {
        anyhow::bail!("speech failed");
    }
    Ok(())
}

#[allow(clippy::future_not_send)]
async fn listen(config: &Config) -> anyhow::Result<()> {
    let mut io = SpeechIo::from_config(config)?;
    if !io.using_stt() {
        anyhow::bail!("no speech-to-text provider is available");
    }

    match io.listener_mut().listen(ctrl_c()).await {
        Ok(text) => println!("{text}"),
        Err(Error::Interrupted) => {}
        Err(Error::NoSpeechDetected) => println!("(no speech detected)"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn providers(config: &Config) -> anyhow::Result<()> {
    let registry = Registry::load(config)?;

    println!("{:<12} {:<7} {:<8} {:<10} {:<12} NOTE", "PROVIDER", "DIR", "ENABLED", "AVAILABLE", "CREDENTIALS");
    for entry in registry.providers() {
        println!(
            "{:<12} {:<7} {:<8} {:<10} {:<12} {}",
            entry.provider.name(),
            entry.provider.direction().as_str(),
            yes_no(entry.enabled),
            yes_no(entry.available),
            yes_no(entry.credentials_present),
            entry.missing.as_deref().unwrap_or("")
        );
    }

    println!();
    for direction in [Direction::Speak, Direction::Listen] {
        let selected = match registry.select(direction) {
            Ok(Selection::Active(id)) => id.name().to_string(),
            Ok(Selection::NoOp { provider, reason }) => format!("none ({provider}: {reason})"),
            Err(e) => format!("none ({e})"),
        };
        println!("{direction}: {selected}");
    }
    Ok(())
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn print_segments(text: &str, max_len: usize) {
    for (i, seg) in segment(text, max_len).iter().enumerate() {
        println!(
            "[{:2}] ({:>4} chars @ {:>4}) {}",
            i + 1,
            seg.text.chars().count(),
            seg.offset,
            seg.text
        );
    }
}

/// Test microphone input
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new(None)?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If the meter moved, your mic is working.");
    println!("Speech usually sits well above the unattended threshold (0.03 RMS).");
    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = Arc::new(AudioPlayback::new()?);

    let sample_rate = 24_000_u32;
    let frequency = 440.0_f32;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();
    let tone = AudioBuffer::new(samples, sample_rate);

    println!("Playing {} samples at {sample_rate} Hz...", tone.samples.len());
    tokio::task::spawn_blocking(move || playback.play(&tone)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Resolves on Ctrl+C; never resolves if the handler can't be installed
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

mod config;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use poise_capture::models::{check_artifact, load_models, readiness_channel};
use poise_capture::{spawn_capture, ModelArtifact, ModelStatus, SessionRecording, SessionReport, StreamStatus};
use poise_core::{Expression, FaceMetrics};
use poise_speech::murf::DEFAULT_CHARACTER;
use poise_speech::MurfService;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "poise", about = "Poise interview practice toolkit")]
struct Cli {
    /// TOML config file; POISE_* environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded session through the face pipeline and print the report
    Analyze {
        /// Recording JSON (per-frame detector output)
        recording: PathBuf,
        /// Pace frames at the configured interval instead of as fast as possible
        #[arg(long)]
        realtime: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the face detection model files are present
    Models {
        /// Override the configured model directory
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// Synthesize interviewer speech and print the audio URL
    Speak {
        /// Interviewer character (jane, mike, sarah)
        #[arg(short = 'C', long, default_value = DEFAULT_CHARACTER)]
        character: String,
        /// Text to speak
        text: String,
        /// Also download the audio to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            recording,
            realtime,
            json,
        } => analyze(&config, recording, realtime, json).await?,
        Commands::Models { dir } => {
            let dir = dir.unwrap_or_else(|| config.model_dir.clone());
            println!("Checking face detection models in {}", dir.display());
            let (tx, _rx) = readiness_channel();
            let result = load_models(
                &dir,
                |artifact: ModelArtifact, dir| {
                    check_artifact(artifact, dir)?;
                    println!("  ok  {artifact}");
                    Ok(())
                },
                &tx,
            );
            match &*tx.borrow() {
                ModelStatus::Ready => println!("Models ready (100%)"),
                ModelStatus::Failed(msg) => println!("{msg}"),
                ModelStatus::Loading { progress } => println!("Loading ({progress}%)"),
            }
            result?;
        }
        Commands::Speak {
            character,
            text,
            out,
        } => {
            let service = MurfService::new(config.murf_config())
                .context("set MURF_API_KEY or murf_api_key in the config file")?;
            let url = service.generate_speech(&text, &character).await?;
            println!("{url}");
            if let Some(out) = out {
                let audio = service.fetch_audio(&url).await?;
                service.save_audio(&audio, &out).await?;
                println!("Saved {} bytes to {}", audio.len(), out.display());
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            let key = if config.murf_api_key.is_some() { "set" } else { "not set" };
            println!("# murf api key: {key}");
        }
    }

    Ok(())
}

async fn analyze(config: &Config, path: PathBuf, realtime: bool, json: bool) -> Result<()> {
    let recording = SessionRecording::from_path(&path)?;
    tracing::info!(
        path = %path.display(),
        frames = recording.frames.len(),
        width = recording.frame_size.width,
        height = recording.frame_size.height,
        "loaded recording"
    );
    let (source, detector) = recording.into_replay();

    // Recorded detections need no weights.
    let (models_tx, models_rx) = readiness_channel();
    models_tx.send_replace(ModelStatus::Ready);

    let mut capture = config.capture_config();
    if !realtime {
        capture.frame_interval = Duration::ZERO;
    }

    let handle = spawn_capture(source, detector, models_rx, capture, |metrics: &FaceMetrics| {
        tracing::debug!(
            expression = %metrics.dominant_expression(),
            eye_contact = metrics.eye_contact,
            confidence = metrics.confidence,
            "frame accepted"
        );
    })?;

    let mut status = handle.status();
    handle.start().await?;

    tokio::select! {
        finished = status.wait_for(|s| matches!(s, StreamStatus::Ended | StreamStatus::Failed(_))) => {
            if let StreamStatus::Failed(msg) = &*finished.map_err(|_| anyhow!("capture engine exited"))? {
                bail!("capture failed: {msg}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, stopping capture");
            handle.stop().await?;
        }
    }

    let report = handle.report().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &SessionReport) {
    let seconds = (report.ended_at - report.started_at).num_milliseconds() as f64 / 1000.0;
    println!(
        "Frames: {} processed, {} accepted ({seconds:.1}s)",
        report.frames_processed, report.frames_accepted
    );

    let Some(summary) = &report.face_metrics else {
        println!("No face data: no frame cleared the confidence gate.");
        return;
    };

    println!("Average confidence: {:.0}%", summary.average_confidence * 100.0);
    println!("Eye contact: {:.0}%", summary.eye_contact_percentage * 100.0);
    if let Some(dominant) = summary.dominant_expression() {
        println!("Dominant expression: {} {dominant}", dominant.emoji());
    }

    let mut frequencies: Vec<(Expression, f32)> = summary.expression_frequencies().into_iter().collect();
    frequencies.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (expression, share) in frequencies {
        println!("  {} {:<10} {:>5.1}%", expression.emoji(), expression.as_str(), share * 100.0);
    }
}

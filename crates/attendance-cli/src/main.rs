use anyhow::{Context, Result};
use attendance_core::{
    capture_enrollment, AttendanceRecord, Config, FaceEncoder, GalleryStore, Ledger,
    NearestMatcher, Session,
};
use attendance_hw::Camera;
use attendance_vision::OnnxFaceEncoder;
use clap::{CommandFactory, Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attendance", about = "Face recognition attendance system")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new face using the webcam
    Enroll {
        /// Person's name
        name: String,
    },
    /// Recognize faces from the webcam and mark attendance
    Recognize,
    /// List attendance entries
    List {
        /// Only show today's entries
        #[arg(long)]
        today: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load().context("failed to load configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after current frame");
            signal_stop.store(true, Ordering::Relaxed);
        }
    });

    // Capture and inference are blocking; keep them off the async workers.
    tokio::task::spawn_blocking(move || match command {
        Commands::Enroll { name } => enroll(&config, &name, &stop),
        Commands::Recognize => recognize(&config, &stop),
        Commands::List { today } => list(&config, today),
    })
    .await?
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    OnnxFaceEncoder::load(&config.detector_model_path(), &config.encoder_model_path())
        .with_context(|| format!("failed to load face models from {}", config.model_dir.display()))
}

fn enroll(config: &Config, name: &str, stop: &AtomicBool) -> Result<()> {
    let store = GalleryStore::new(config.gallery_path.clone());
    let mut encoder = load_encoder(config)?;

    let camera = Camera::open(&config.camera_device).context("could not open webcam")?;
    let mut feed = camera.stream()?;

    tracing::info!(name, "position your face in front of the camera");
    capture_enrollment(
        name,
        &mut feed,
        &mut encoder,
        &store,
        config.enroll_attempts,
        stop,
    )
    .context("enrollment failed")?;

    println!("Successfully enrolled: {name}");
    Ok(())
}

fn recognize(config: &Config, stop: &AtomicBool) -> Result<()> {
    let gallery = GalleryStore::new(config.gallery_path.clone())
        .load()
        .context("failed to load enrolled faces")?;
    if gallery.is_empty() {
        tracing::warn!("No enrolled faces found. Use 'enroll' command first.");
        return Ok(());
    }

    let ledger = Ledger::new(config.ledger_path.clone());
    ledger.ensure_storage()?;

    let mut encoder = load_encoder(config)?;
    let camera = Camera::open(&config.camera_device).context("could not open webcam")?;
    let mut feed = camera.stream()?;

    let matcher = NearestMatcher::new(encoder.metric());
    tracing::info!(
        enrolled = gallery.len(),
        tolerance = config.tolerance,
        metric = ?matcher.metric(),
        frame_skip = config.frame_skip,
        "Looking for faces... Press Ctrl-C to exit."
    );

    let mut session = Session::with_matcher(config, &gallery, &ledger, matcher);
    let summary = session.run(&mut feed, &mut encoder, stop)?;

    for name in &summary.marked {
        println!("Attendance marked for: {name}");
    }
    Ok(())
}

fn list(config: &Config, today: bool) -> Result<()> {
    let ledger = Ledger::new(config.ledger_path.clone());
    let records = if today {
        ledger.load_today()?
    } else {
        ledger.load_all()?
    };

    if records.is_empty() {
        tracing::info!("No attendance records found.");
        return Ok(());
    }
    for record in &records {
        println!("{}", format_record(record));
    }
    Ok(())
}

fn format_record(record: &AttendanceRecord) -> String {
    format!("{}\t{}\t{}", record.timestamp, record.name, record.status)
}

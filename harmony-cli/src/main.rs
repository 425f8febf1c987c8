use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::{Receiver, select};
use harmony_core::{
    ChannelListener, NoteRecorder, PitchTracker, ScenarioChecker, Score, TrackerConfig,
    TrackerEvent, default_input_device_name, list_input_devices,
};
use log::info;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Listens to a microphone and reports the notes being played or sung
#[derive(Parser)]
#[command(name = "harmony-listen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every stable note change until Enter is pressed
    Listen {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// Record notes until Enter is pressed, then print them as a score
    Record {
        /// Score name (defaults to the current time)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// Play through a note sequence, e.g. "C3-E3-G3"
    Lesson {
        /// Notes to play, separated by '-'
        #[arg(conflicts_with = "score", required_unless_present = "score")]
        notes: Option<String>,

        /// Lesson file in score JSON format
        #[arg(long)]
        score: Option<PathBuf>,

        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// List audio input devices
    Devices,
    /// Show the effective tracker configuration
    ShowConfig {
        #[command(flatten)]
        tracker: TrackerArgs,
    },
}

#[derive(Args)]
struct TrackerArgs {
    /// Tracker configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input device name
    #[arg(short, long)]
    device: Option<String>,

    /// Frequency of A4 in Hz
    #[arg(long)]
    concert_pitch: Option<f32>,
}

impl TrackerArgs {
    fn load(&self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => TrackerConfig::from_json_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => TrackerConfig::default(),
        };
        if let Some(device) = &self.device {
            config.device = Some(device.clone());
        }
        if let Some(concert_pitch) = self.concert_pitch {
            config.concert_pitch_hz = concert_pitch;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { tracker } => {
            let tracker = PitchTracker::new(tracker.load()?)?;
            run_session(&tracker, None)?;
        }
        Commands::Record { name, tracker } => {
            let tracker = PitchTracker::new(tracker.load()?)?;
            let recorder = Arc::new(NoteRecorder::new());
            tracker.subscribe(recorder.clone());
            run_session(&tracker, None)?;

            let name = name.unwrap_or_else(|| format!("recording-{}", unix_time()));
            println!("{}", serde_json::to_string_pretty(&recorder.score(name))?);
        }
        Commands::Lesson {
            notes,
            score,
            tracker,
        } => {
            let play_notes = match (notes, score) {
                (Some(notes), _) => notes,
                (None, Some(path)) => load_score(&path)?.play_notes,
                (None, None) => return Err(anyhow!("no notes given")),
            };
            let checker = Arc::new(
                ScenarioChecker::from_play_notes(&play_notes)
                    .with_context(|| format!("invalid note sequence '{}'", play_notes))?,
            );
            let tracker = PitchTracker::new(tracker.load()?)?;
            tracker.subscribe(checker.clone());
            println!("Play: {}", play_notes);

            let completion = checker.completion();
            run_session(&tracker, Some(&completion))?;
            let progress = checker.progress();
            if progress.is_complete() {
                println!("You did it!");
            } else {
                println!(
                    "Stopped at {}% ({} of {} notes)",
                    progress.percent(),
                    progress.matched,
                    progress.total
                );
            }
        }
        Commands::Devices => {
            let default = default_input_device_name().ok();
            for name in list_input_devices()? {
                let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{} {}", marker, name);
            }
        }
        Commands::ShowConfig { tracker } => {
            println!("{}", tracker.load()?.to_json_pretty()?);
        }
    }

    Ok(())
}

/// Runs the tracker until Enter is pressed, `done` fires, or capture fails.
fn run_session(tracker: &PitchTracker, done: Option<&Receiver<()>>) -> Result<()> {
    let (listener, events) = ChannelListener::channel();
    tracker.subscribe(listener);
    tracker
        .start()
        .map_err(|e| anyhow!("microphone unavailable: {}", e))?;
    println!("Listening, press Enter to stop.");

    let enter = stdin_line();
    let never = crossbeam_channel::never();
    let done = done.unwrap_or(&never);

    let outcome = loop {
        select! {
            recv(events) -> event => match event {
                Ok(TrackerEvent::Note(event)) => match event.cents() {
                    Some(cents) => println!(
                        "{:<4} {:8.2} Hz  (target {:8.2} Hz, {:+5.1} cents)",
                        event.label(),
                        event.heard_frequency_hz(),
                        event.closest_pitch_hz(),
                        cents
                    ),
                    None => println!("{}", event.label()),
                },
                Ok(TrackerEvent::CaptureFailed(e)) => break Err(anyhow!("microphone unavailable: {}", e)),
                Err(_) => break Ok(()),
            },
            recv(enter) -> _ => break Ok(()),
            recv(done) -> _ => {
                info!("lesson complete");
                break Ok(());
            },
        }
    };

    tracker.stop()?;
    outcome
}

/// Fires once when a line is read from stdin.
fn stdin_line() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

fn load_score(path: &Path) -> Result<Score> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

fn unix_time() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

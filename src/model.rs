use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: String,
    pub source: PathBuf,
    pub timestamps: Vec<f64>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(with = "humantime_serde")]
    pub before: Duration,
    #[serde(with = "humantime_serde")]
    pub after: Duration,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub cache_dir: PathBuf,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Probe,
    Cut,
    Concat,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    PhaseStarted {
        phase: Phase,
    },
    DurationProbed {
        seconds: f64,
    },
    ClipCut {
        position: usize,
        window: ClipWindow,
    },
    ClipSkipped {
        position: usize,
        timestamp: f64,
    },
    ClipFailed {
        position: usize,
        window: ClipWindow,
        message: String,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    Cancelling,
    CleanedUp { removed: usize },
}

impl InfoEvent {
    /// Render a human-readable message for the CLI.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::Cancelling => "Cancelling…".to_string(),
            InfoEvent::CleanedUp { removed } => {
                format!("Removed {} temporary file(s)", removed)
            }
        }
    }
}

/// A time range of the source video, centred on a requested timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipWindow {
    pub timestamp: f64,
    pub start: f64,
    pub end: f64,
}

impl ClipWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClipStatus {
    /// Clip was cut; `index` is its position in the merged video.
    Cut { index: usize },
    Skipped,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipReport {
    pub timestamp: f64,
    pub window: Option<ClipWindow>,
    #[serde(flatten)]
    pub status: ClipStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default)]
    pub timestamp_utc: String,
    pub run_id: String,
    pub source: PathBuf,
    pub source_duration_secs: f64,
    pub requested: Vec<f64>,
    #[serde(default)]
    pub comments: Option<String>,
    pub clips: Vec<ClipReport>,
    pub merged_path: PathBuf,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    pub elapsed_ms: u64,
}

impl RunResult {
    pub fn clips_cut(&self) -> usize {
        self.clips
            .iter()
            .filter(|c| matches!(c.status, ClipStatus::Cut { .. }))
            .count()
    }

    /// Total length of the merged video, as planned from the cut windows.
    pub fn highlight_secs(&self) -> f64 {
        self.clips
            .iter()
            .filter(|c| matches!(c.status, ClipStatus::Cut { .. }))
            .filter_map(|c| c.window.as_ref())
            .map(ClipWindow::duration)
            .sum()
    }
}

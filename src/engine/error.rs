//! Error types for the media layer.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{tool} not found; install FFmpeg or pass its path explicitly")]
    ToolNotFound { tool: &'static str },

    #[error("FFmpeg command failed (exit code {}): {message}", display_code(*exit_code))]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFprobe duration check returned empty output")]
    EmptyProbeOutput,

    #[error("Could not parse duration value: {0}")]
    UnparseableDuration(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out after {}", display_duration(.0))]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_duration(d: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*d)
}

fn display_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled)
    }

    /// Last stderr lines captured from the tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            MediaError::FfmpegFailed { stderr, .. } | MediaError::FfprobeFailed { stderr, .. } => {
                stderr.as_deref()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffmpeg_failure_message_includes_exit_code() {
        let e = MediaError::ffmpeg_failed("cut failed", Some("moov atom not found".into()), Some(1));
        assert_eq!(e.to_string(), "FFmpeg command failed (exit code 1): cut failed");
        assert_eq!(e.stderr(), Some("moov atom not found"));

        let killed = MediaError::ffmpeg_failed("cut failed", None, None);
        assert!(killed.to_string().contains("exit code none"));
    }

    #[test]
    fn timeout_message_keeps_sub_second_limits() {
        let e = MediaError::Timeout(Duration::from_millis(500));
        assert_eq!(e.to_string(), "Operation timed out after 500ms");
        let e = MediaError::Timeout(Duration::from_secs(90));
        assert_eq!(e.to_string(), "Operation timed out after 1m 30s");
    }
}

//! Text summary builder for CLI output.
//!
//! This module formats human-readable lines for text mode and history listings.

use crate::model::{ClipStatus, RunResult};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary for a finished run.
pub(crate) fn build_text_summary(r: &RunResult) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!(
        "Source: {} ({})",
        r.source.display(),
        format_clock(r.source_duration_secs)
    ));
    if let Some(comments) = r.comments.as_deref() {
        if !comments.trim().is_empty() {
            lines.push(format!("Comments: {}", comments));
        }
    }

    for clip in &r.clips {
        let line = match (&clip.status, clip.window.as_ref()) {
            (ClipStatus::Cut { index }, Some(w)) => format!(
                "  #{:<2} {:>9}  {} - {}",
                index,
                format_clock(clip.timestamp),
                format_clock(w.start),
                format_clock(w.end)
            ),
            (ClipStatus::Failed { message }, _) => format!(
                "  --  {:>9}  failed: {}",
                format_clock(clip.timestamp),
                message
            ),
            _ => format!(
                "  --  {:>9}  skipped (outside video)",
                format_clock(clip.timestamp)
            ),
        };
        lines.push(line);
    }

    lines.push(format!(
        "Clips: {} of {} requested, {} of highlights",
        r.clips_cut(),
        r.requested.len(),
        format_clock(r.highlight_secs())
    ));
    let out = r.output_path.as_ref().unwrap_or(&r.merged_path);
    lines.push(format!("Output: {}", out.display()));
    lines.push(format!("Took {:.1}s", r.elapsed_ms as f64 / 1000.0));

    TextSummary { lines }
}

/// One line per run, for `--history`.
pub(crate) fn history_line(r: &RunResult) -> String {
    let out = r
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());
    format!(
        "{}  {}  {}/{} clips  {}",
        r.timestamp_utc,
        r.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| r.source.display().to_string()),
        r.clips_cut(),
        r.requested.len(),
        out
    )
}

/// `m:ss.s` below an hour, `h:mm:ss.s` above.
pub(crate) fn format_clock(secs: f64) -> String {
    let secs = secs.max(0.0);
    let tenths = (secs * 10.0).round() as u64;
    let (whole, frac) = (tenths / 10, tenths % 10);
    let (h, m, s) = (whole / 3600, (whole / 60) % 60, whole % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}.{frac}")
    } else {
        format!("{m}:{s:02}.{frac}")
    }
}

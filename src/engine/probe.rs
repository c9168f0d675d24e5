//! FFprobe queries: duration and a human-readable format dump.

use std::path::Path;

use super::error::{MediaError, MediaResult};
use super::ffmpeg::ProcessRunner;

/// Query the container duration in seconds.
pub async fn probe_duration(runner: &ProcessRunner, path: &Path) -> MediaResult<f64> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let mut args: Vec<std::ffi::OsString> = [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
    ]
    .into_iter()
    .map(Into::into)
    .collect();
    args.push(path.as_os_str().to_owned());

    let out = runner.run(args).await?;
    if !out.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("exit code {:?}", out.status.code()),
            stderr: Some(out.stderr_tail),
        });
    }

    parse_duration_output(&out.stdout)
}

/// Parse the single value printed by the duration query.
pub fn parse_duration_output(output: &str) -> MediaResult<f64> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(MediaError::EmptyProbeOutput);
    }
    // Some containers report one value per program; the first line is the format duration.
    let first = trimmed.lines().next().unwrap_or(trimmed).trim();
    match first.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(MediaError::UnparseableDuration(first.to_string())),
    }
}

/// Human-readable stream and format dump for a file.
///
/// FFprobe writes this to stderr, so stdout is only preferred when it has content.
pub async fn media_info(runner: &ProcessRunner, path: &Path) -> MediaResult<String> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    let args: Vec<std::ffi::OsString> = vec!["-hide_banner".into(), "-i".into(), path.into()];
    let out = runner.run(args).await?;
    Ok(pick_info_text(&out.stdout, &out.stderr))
}

fn pick_info_text(stdout: &str, stderr: &str) -> String {
    let text = if stdout.trim().is_empty() { stderr } else { stdout };
    if text.trim().is_empty() {
        "No Output".to_string()
    } else {
        text.trim_end().to_string()
    }
}

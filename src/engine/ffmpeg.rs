//! FFmpeg argument builder and process runner.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::error::{MediaError, MediaResult};

/// How many trailing stderr lines are kept for error reports.
const STDERR_TAIL_LINES: usize = 64;

/// Builder for FFmpeg argument lists.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Input seek (fast, demuxer level).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format_secs(seconds))
    }

    /// Limit how much is written, measured from the seek point.
    pub fn duration(self, seconds: f64) -> Self {
        self.output_arg("-t").output_arg(format_secs(seconds))
    }

    /// Force an input format, e.g. `concat`.
    pub fn input_format(self, format: impl Into<String>) -> Self {
        self.input_arg("-f").input_arg(format)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Copy every stream without re-encoding.
    pub fn codec_copy(self) -> Self {
        self.output_arg("-c").output_arg("copy")
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn build_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-nostdin", "-v"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(self.log_level.clone().into());
        args.extend(self.input_args.iter().map(OsString::from));
        args.push("-i".into());
        args.push(self.input.clone().into_os_string());
        args.extend(self.output_args.iter().map(OsString::from));
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// Seconds with millisecond precision, the way FFmpeg accepts them.
pub fn format_secs(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

/// Runs an external tool to completion, honouring cancellation and an optional timeout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    cancel_rx: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

/// Exit status and captured output of a finished process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    /// Everything the tool wrote to stderr.
    pub stderr: String,
    /// Last `STDERR_TAIL_LINES` lines of stderr, for error reports.
    pub stderr_tail: String,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cancel_rx: None,
            timeout: None,
        }
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run an FFmpeg command; a non-zero exit becomes `MediaError::FfmpegFailed`.
    pub async fn run_ffmpeg(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let out = self.run(cmd.build_args()).await?;
        if out.status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                format!("could not write {}", cmd.output_path().display()),
                non_empty(out.stderr_tail),
                out.status.code(),
            ))
        }
    }

    /// Spawn the program with `args` and wait for it.
    pub async fn run<I, S>(&self, args: I) -> MediaResult<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        debug!(
            "Running: {} {}",
            self.program.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stdout_handle = tokio::spawn(async move {
            let mut buf = String::new();
            if let Some(out) = stdout {
                read_lines_lossy(out, |line| {
                    buf.push_str(&line);
                    buf.push('\n');
                })
                .await;
            }
            buf
        });

        let stderr = child.stderr.take();
        let stderr_handle = tokio::spawn(async move {
            let mut full = String::new();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(err) = stderr {
                read_lines_lossy(err, |line| {
                    trace!(target: "highlight_clipper::tool", "{}", line);
                    full.push_str(&line);
                    full.push('\n');
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                })
                .await;
            }
            (full, tail.into_iter().collect::<Vec<_>>().join("\n"))
        });

        let mut cancel_rx = self.cancel_rx.clone();
        let timeout = self.timeout;

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = wait_cancelled(cancel_rx.as_mut()) => {
                warn!("Cancellation requested, killing {}", self.program.display());
                let _ = child.kill().await;
                return Err(MediaError::Cancelled);
            }
            _ = sleep_or_forever(timeout) => {
                let limit = timeout.unwrap_or_default();
                warn!(
                    "{} timed out after {}, killing process",
                    self.program.display(),
                    humantime::format_duration(limit)
                );
                let _ = child.kill().await;
                return Err(MediaError::Timeout(limit));
            }
        };

        let stdout = stdout_handle.await.unwrap_or_default();
        let (stderr, stderr_tail) = stderr_handle.await.unwrap_or_default();

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
            stderr_tail,
        })
    }
}

/// Feed every line of `reader` to `on_line` until EOF.
///
/// Bytes that are not UTF-8 (Latin-1 tags are common) are replaced, and the
/// pipe is drained to the end so the child never blocks or gets SIGPIPE.
async fn read_lines_lossy<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                on_line(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => {
                debug!("stopped reading tool output: {}", e);
                break;
            }
        }
    }
}

/// Resolves once the cancel flag is set; never resolves without a receiver.
pub(crate) async fn wait_cancelled(rx: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return futures::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling.
            return futures::future::pending().await;
        }
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(t) => tokio::time::sleep(t).await,
        None => futures::future::pending().await,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Resolve a tool binary: explicit path first, then `PATH`.
pub fn resolve_tool(explicit: Option<&Path>, name: &'static str) -> MediaResult<PathBuf> {
    match explicit {
        Some(p) if p.is_file() => Ok(p.to_path_buf()),
        Some(p) => which::which(p).map_err(|_| MediaError::ToolNotFound { tool: name }),
        None => which::which(name).map_err(|_| MediaError::ToolNotFound { tool: name }),
    }
}

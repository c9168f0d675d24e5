use crate::engine::toolkit::{FfmpegToolkit, MediaToolkit};
use crate::engine::{EngineControl, HighlightEngine};
use crate::model::{InfoEvent, JobEvent, Phase, RunConfig, RunResult};
use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::RngCore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "highlight-clipper",
    version,
    about = "Cut short clips around timestamps of a video and merge them into one highlight video"
)]
pub struct Cli {
    /// Source video (path, ~/path or file:// URI)
    pub input: Option<String>,

    /// Comma-separated timestamps: seconds (12.5) or clock time (1:03, 01:02:03)
    #[arg(short, long)]
    pub timestamps: Option<String>,

    /// Padding kept before each timestamp
    #[arg(long, default_value = "1s")]
    pub before: humantime::Duration,

    /// Padding kept after each timestamp
    #[arg(long, default_value = "1s")]
    pub after: humantime::Duration,

    /// Print media information for the input and exit
    #[arg(long)]
    pub info: bool,

    /// Print the N most recent runs and exit
    #[arg(long, value_name = "N")]
    pub history: Option<usize>,

    /// Print JSON result and exit
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for scripts)
    #[arg(long)]
    pub silent: bool,

    /// Video encoder for cut clips
    #[arg(long, default_value = "libx264")]
    pub video_codec: String,

    /// Audio encoder for cut clips
    #[arg(long, default_value = "aac")]
    pub audio_codec: String,

    /// Encoder preset for cut clips
    #[arg(long, default_value = "ultrafast")]
    pub preset: String,

    /// Directory for merged videos [default: user data dir]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Exact path for the merged video (overrides --output-dir)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Scratch directory for intermediate clips [default: user cache dir]
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "HIGHLIGHT_CLIPPER_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Path to the ffprobe binary
    #[arg(long, env = "HIGHLIGHT_CLIPPER_FFPROBE")]
    pub ffprobe: Option<PathBuf>,

    /// Kill any single ffmpeg/ffprobe invocation that runs longer than this
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Export results as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Use --auto-save true or --auto-save false to override
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_save: bool,

    /// Attach custom comments to this run
    #[arg(long)]
    pub comments: Option<String>,
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    if let Some(n) = args.history {
        return run_history(n, args.json);
    }

    if args.info {
        return run_info(&args).await;
    }

    run_job(args).await
}

/// Generate a random identifier for a run.
fn gen_run_id() -> String {
    let mut b = [0u8; 6];
    rand::thread_rng().fill_bytes(&mut b);
    b.iter().map(|x| format!("{x:02x}")).collect()
}

fn require_input(args: &Cli) -> Result<PathBuf> {
    let raw = args
        .input
        .as_deref()
        .context("No video selected. Please pass a video file.")?;
    crate::source::normalize_source(raw)
}

/// Build a `RunConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> Result<RunConfig> {
    let source = require_input(args)?;
    let timestamps = crate::source::parse_timestamps(args.timestamps.as_deref().unwrap_or(""))?;
    Ok(RunConfig {
        run_id: gen_run_id(),
        source,
        timestamps,
        comments: args.comments.clone(),
        before: Duration::from(args.before),
        after: Duration::from(args.after),
        video_codec: args.video_codec.clone(),
        audio_codec: args.audio_codec.clone(),
        preset: args.preset.clone(),
        cache_dir: std::path::absolute(
            args.cache_dir
                .clone()
                .unwrap_or_else(crate::storage::cache_dir),
        )
        .context("invalid cache dir")?,
        ffmpeg: args.ffmpeg.clone(),
        ffprobe: args.ffprobe.clone(),
        timeout: args.timeout.map(Duration::from),
    })
}

fn run_history(limit: usize, json: bool) -> Result<()> {
    let runs = crate::storage::load_recent(limit).context("failed to load run history")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        eprintln!("No saved runs.");
    }
    for r in &runs {
        println!("{}", crate::text_summary::history_line(r));
    }
    Ok(())
}

async fn run_info(args: &Cli) -> Result<()> {
    let source = require_input(args)?;
    let ffprobe = crate::engine::ffmpeg::resolve_tool(args.ffprobe.as_deref(), "ffprobe")?;
    let runner = crate::engine::ffmpeg::ProcessRunner::new(ffprobe)
        .with_timeout(args.timeout.map(Duration::from));

    let info = crate::engine::probe::media_info(&runner, &source)
        .await
        .context("failed to load media info")?;

    if args.json {
        let duration = crate::engine::probe::probe_duration(&runner, &source).await.ok();
        let out = serde_json::json!({
            "source": source,
            "duration_secs": duration,
            "info": info,
        });
        if !args.silent {
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    } else {
        println!("{}", info);
    }
    Ok(())
}

const INTERRUPT_NOTICE: &str =
    "Interrupt received; finishing cleanup and saving the merged video, please wait";

/// Forward every Ctrl-C to the engine as a cancel request.
///
/// Runs until aborted after post-processing, so a Ctrl-C that arrives while
/// the merged video is moved into place is reported instead of dropped.
fn spawn_ctrl_c_forwarder(
    ctrl_tx: mpsc::UnboundedSender<EngineControl>,
    notice_tx: Option<mpsc::UnboundedSender<OutputLine>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if let Some(notice) = forward_interrupt(&ctrl_tx) {
                tracing::warn!("{}", notice);
                if let Some(tx) = notice_tx.as_ref() {
                    let _ = tx.send(OutputLine::Stderr(notice.to_string()));
                }
            }
        }
    })
}

/// Ask the engine to cancel; once it no longer listens, return the notice to show.
fn forward_interrupt(ctrl_tx: &mpsc::UnboundedSender<EngineControl>) -> Option<&'static str> {
    match ctrl_tx.send(EngineControl::Cancel) {
        Ok(()) => None,
        Err(_) => Some(INTERRUPT_NOTICE),
    }
}

/// Render an engine event for text mode; `None` for events that stay quiet.
fn event_line(ev: &JobEvent, total: usize) -> Option<String> {
    match ev {
        JobEvent::PhaseStarted { phase } => match phase {
            Phase::Summary => None,
            _ => Some(format!("== {phase:?} ==")),
        },
        JobEvent::DurationProbed { seconds } => Some(format!(
            "Duration: {}",
            crate::text_summary::format_clock(*seconds)
        )),
        JobEvent::ClipCut { position, window } => Some(format!(
            "[{}/{}] cut {:.3}s - {:.3}s",
            position + 1,
            total,
            window.start,
            window.end
        )),
        JobEvent::ClipSkipped {
            position,
            timestamp,
        } => Some(format!(
            "[{}/{}] skipped {:.3}s (outside video)",
            position + 1,
            total,
            timestamp
        )),
        JobEvent::ClipFailed {
            position,
            window,
            message,
        } => Some(format!(
            "[{}/{}] failed at {:.3}s: {}",
            position + 1,
            total,
            window.timestamp,
            message
        )),
        JobEvent::Info(InfoEvent::CleanedUp { removed: 0 }) => None,
        JobEvent::Info(info) => Some(info.to_message()),
    }
}

async fn run_job(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::from_config(&cfg)?);
    let total = cfg.timestamps.len();
    tracing::debug!("Starting run {} with {} timestamp(s)", cfg.run_id, total);

    let text_mode = !args.json;
    let (out_tx, out_handle) = if args.silent {
        (None, None)
    } else {
        let (tx, handle) = spawn_output_writer();
        (Some(tx), Some(handle))
    };

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<JobEvent>();
    let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel::<EngineControl>();
    let ctrl_c = spawn_ctrl_c_forwarder(ctrl_tx, out_tx.clone());

    let engine = HighlightEngine::new(cfg, toolkit);
    let handle = tokio::spawn(async move { engine.run(evt_tx, ctrl_rx).await });

    while let Some(ev) = evt_rx.recv().await {
        if !text_mode {
            // JSON and silent modes only report the final result
            continue;
        }
        if let (Some(tx), Some(line)) = (out_tx.as_ref(), event_line(&ev, total)) {
            let _ = tx.send(OutputLine::Stderr(line));
        }
    }

    let run_res = handle.await.context("highlight task failed");
    let processed = match run_res.and_then(|r| r.context("highlight extraction failed")) {
        Ok(result) => crate::orchestrator::process_run_completion(&args, result).await,
        Err(e) => Err(e),
    };
    ctrl_c.abort();
    let processed = processed?;

    if let Some(tx) = out_tx.as_ref() {
        if text_mode {
            let summary = crate::text_summary::build_text_summary(&processed.result);
            for line in summary.lines {
                let _ = tx.send(OutputLine::Stdout(line));
            }
        } else {
            let out = serde_json::to_string_pretty(&processed.result)?;
            let _ = tx.send(OutputLine::Stdout(out));
        }
        for msg in &processed.messages {
            let _ = tx.send(OutputLine::Stderr(msg.clone()));
        }
        if let Some(p) = processed.auto_saved_path.as_ref() {
            let _ = tx.send(OutputLine::Stderr(format!("Saved run: {}", p.display())));
        }
    } else if args.auto_save && processed.auto_saved_path.is_none() {
        bail!("failed to save run results");
    }

    if let Some(tx) = out_tx {
        drop(tx);
    }
    if let Some(handle) = out_handle {
        let _ = handle.await;
    }

    Ok(())
}

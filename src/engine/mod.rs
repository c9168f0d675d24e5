mod concat;
pub mod error;
pub mod ffmpeg;
pub mod probe;
pub mod toolkit;
mod window;
mod workspace;

use crate::model::{
    ClipReport, ClipStatus, InfoEvent, JobEvent, Phase, RunConfig, RunResult,
};
use anyhow::{bail, Context, Result};
use error::MediaError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use toolkit::MediaToolkit;
use tracing::{debug, info, warn};
use workspace::ClipWorkspace;

pub use window::plan_window;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop the job; the running tool is killed and temp files are removed.
    Cancel,
}

pub struct HighlightEngine {
    cfg: RunConfig,
    toolkit: Arc<dyn MediaToolkit>,
}

/// Clips produced so far, in merged order.
struct CutOutcome {
    clips: Vec<PathBuf>,
    reports: Vec<ClipReport>,
}

impl HighlightEngine {
    pub fn new(cfg: RunConfig, toolkit: Arc<dyn MediaToolkit>) -> Self {
        Self { cfg, toolkit }
    }

    /// Where the merged video for a run is written before post-processing moves it.
    pub fn merged_path(cache_dir: &Path, run_id: &str) -> PathBuf {
        cache_dir.join(format!("output_merged-{run_id}.mp4"))
    }

    pub async fn run(
        self,
        event_tx: mpsc::UnboundedSender<JobEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<RunResult> {
        let started = Instant::now();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // Control listener.
        let ev_ctrl = event_tx.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Cancel => {
                        let _ = ev_ctrl.send(JobEvent::Info(InfoEvent::Cancelling));
                        let _ = cancel_tx.send(true);
                        break;
                    }
                }
            }
        });

        let res = self.run_inner(&event_tx, cancel_rx, started).await;

        // Dropping a JoinHandle does not stop the task.
        control_handle.abort();
        res
    }

    async fn run_inner(
        &self,
        event_tx: &mpsc::UnboundedSender<JobEvent>,
        cancel_rx: watch::Receiver<bool>,
        started: Instant,
    ) -> Result<RunResult> {
        let cfg = &self.cfg;

        let _ = event_tx.send(JobEvent::PhaseStarted {
            phase: Phase::Probe,
        });
        let duration = self
            .toolkit
            .probe_duration(&cfg.source)
            .await
            .with_context(|| format!("failed to probe {}", cfg.source.display()))?;
        if !duration.is_finite() || duration <= 0.0 {
            bail!("Invalid video file or unable to read duration.");
        }
        info!("Probed {}: {:.3}s", cfg.source.display(), duration);
        let _ = event_tx.send(JobEvent::DurationProbed { seconds: duration });

        // The concat demuxer resolves list entries against the list file, so
        // every path handed to FFmpeg must be absolute.
        let cache_dir = std::path::absolute(&cfg.cache_dir)
            .with_context(|| format!("invalid cache dir {}", cfg.cache_dir.display()))?;
        tokio::fs::create_dir_all(&cache_dir)
            .await
            .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
        let mut ws = ClipWorkspace::create(&cache_dir, &cfg.run_id)
            .await
            .context("failed to create clip workspace")?;

        debug!("Cutting clips into {}", ws.dir().display());

        let merged = Self::merged_path(&cache_dir, &cfg.run_id);
        let outcome = self
            .cut_and_join(&mut ws, duration, &merged, event_tx, cancel_rx)
            .await;

        // Temp clips go away whatever happened above.
        let removed = ws.cleanup().await;
        let _ = event_tx.send(JobEvent::Info(InfoEvent::CleanedUp { removed }));

        let reports = outcome?;
        let _ = event_tx.send(JobEvent::PhaseStarted {
            phase: Phase::Summary,
        });

        Ok(RunResult {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            run_id: cfg.run_id.clone(),
            source: cfg.source.clone(),
            source_duration_secs: duration,
            requested: cfg.timestamps.clone(),
            comments: cfg.comments.clone(),
            clips: reports,
            merged_path: merged,
            output_path: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn cut_and_join(
        &self,
        ws: &mut ClipWorkspace,
        duration: f64,
        merged: &std::path::Path,
        event_tx: &mpsc::UnboundedSender<JobEvent>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<Vec<ClipReport>> {
        let _ = event_tx.send(JobEvent::PhaseStarted { phase: Phase::Cut });
        let CutOutcome { clips, reports } =
            self.cut_clips(ws, duration, event_tx, cancel_rx.clone()).await?;

        if clips.is_empty() {
            bail!("No valid clips could be generated.");
        }

        let _ = event_tx.send(JobEvent::PhaseStarted {
            phase: Phase::Concat,
        });
        match tokio::fs::remove_file(merged).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to remove old output {}", merged.display()))
            }
        }

        let _ = event_tx.send(JobEvent::Info(InfoEvent::Message(format!(
            "Joining {} clip(s)",
            clips.len()
        ))));
        let list = ws.list_path();
        concat::write_concat_list(&list, &clips)
            .await
            .context("failed to write concat list")?;
        self.toolkit
            .concat(&list, merged, cancel_rx)
            .await
            .context("failed to join clips")?;
        info!("Joined {} clip(s) into {}", clips.len(), merged.display());

        Ok(reports)
    }

    async fn cut_clips(
        &self,
        ws: &mut ClipWorkspace,
        duration: f64,
        event_tx: &mpsc::UnboundedSender<JobEvent>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<CutOutcome> {
        let cfg = &self.cfg;
        let mut clips = Vec::new();
        let mut reports = Vec::with_capacity(cfg.timestamps.len());

        for (position, &timestamp) in cfg.timestamps.iter().enumerate() {
            if *cancel_rx.borrow() {
                return Err(MediaError::Cancelled.into());
            }

            let Some(window) = plan_window(timestamp, duration, cfg.before, cfg.after) else {
                info!("Timestamp {:.3}s lies outside the video, skipping", timestamp);
                let _ = event_tx.send(JobEvent::ClipSkipped {
                    position,
                    timestamp,
                });
                reports.push(ClipReport {
                    timestamp,
                    window: None,
                    status: ClipStatus::Skipped,
                });
                continue;
            };

            // Index only advances on success, so a failed cut's path is reused.
            let index = clips.len();
            let out = ws.clip_path(index);
            match self
                .toolkit
                .cut_clip(&cfg.source, &window, &out, cancel_rx.clone())
                .await
            {
                Ok(()) => {
                    let _ = event_tx.send(JobEvent::ClipCut { position, window });
                    reports.push(ClipReport {
                        timestamp,
                        window: Some(window),
                        status: ClipStatus::Cut { index },
                    });
                    clips.push(out);
                }
                Err(e) if e.is_cancelled() => return Err(e.into()),
                Err(e) => {
                    warn!(
                        "Cut at {:.3}s failed: {}{}",
                        timestamp,
                        e,
                        e.stderr().map(|s| format!("\n{s}")).unwrap_or_default()
                    );
                    let message = e.to_string();
                    let _ = event_tx.send(JobEvent::ClipFailed {
                        position,
                        window,
                        message: message.clone(),
                    });
                    reports.push(ClipReport {
                        timestamp,
                        window: Some(window),
                        status: ClipStatus::Failed { message },
                    });
                }
            }
        }

        Ok(CutOutcome { clips, reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::MediaResult;
    use crate::model::ClipWindow;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes small placeholder files instead of running FFmpeg.
    #[derive(Default)]
    struct FakeToolkit {
        duration: f64,
        fail_at: Vec<f64>,
        fail_concat: bool,
        cancel_on_cut: Option<mpsc::UnboundedSender<EngineControl>>,
        cuts: Mutex<Vec<(ClipWindow, PathBuf)>>,
        concat_list: Mutex<Option<String>>,
    }

    #[async_trait]
    impl MediaToolkit for FakeToolkit {
        async fn probe_duration(&self, _source: &Path) -> MediaResult<f64> {
            Ok(self.duration)
        }

        async fn cut_clip(
            &self,
            _source: &Path,
            window: &ClipWindow,
            output: &Path,
            mut cancel: watch::Receiver<bool>,
        ) -> MediaResult<()> {
            self.cuts
                .lock()
                .unwrap()
                .push((*window, output.to_path_buf()));
            if let Some(tx) = &self.cancel_on_cut {
                tx.send(EngineControl::Cancel).unwrap();
                let _ = tokio::time::timeout(Duration::from_secs(5), cancel.changed()).await;
                return Err(MediaError::Cancelled);
            }
            if self.fail_at.contains(&window.timestamp) {
                return Err(MediaError::ffmpeg_failed("boom", None, Some(1)));
            }
            tokio::fs::write(output, b"clip").await?;
            Ok(())
        }

        async fn concat(
            &self,
            list_file: &Path,
            output: &Path,
            _cancel: watch::Receiver<bool>,
        ) -> MediaResult<()> {
            *self.concat_list.lock().unwrap() = Some(tokio::fs::read_to_string(list_file).await?);
            if self.fail_concat {
                return Err(MediaError::ffmpeg_failed("concat", None, Some(1)));
            }
            tokio::fs::write(output, b"merged").await?;
            Ok(())
        }
    }

    fn config(cache: &Path, timestamps: Vec<f64>) -> RunConfig {
        RunConfig {
            run_id: "t1".into(),
            source: PathBuf::from("/videos/source.mp4"),
            timestamps,
            comments: None,
            before: Duration::from_secs(1),
            after: Duration::from_secs(1),
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            preset: "ultrafast".into(),
            cache_dir: cache.to_path_buf(),
            ffmpeg: None,
            ffprobe: None,
            timeout: None,
        }
    }

    async fn run_engine(
        cfg: RunConfig,
        kit: Arc<FakeToolkit>,
    ) -> (Result<RunResult>, Vec<JobEvent>) {
        let (evt_tx, mut evt_rx) = mpsc::unbounded_channel();
        let (_ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let res = HighlightEngine::new(cfg, kit).run(evt_tx, ctrl_rx).await;
        let mut events = Vec::new();
        while let Ok(ev) = evt_rx.try_recv() {
            events.push(ev);
        }
        (res, events)
    }

    fn workspace_is_gone(cache: &Path) -> bool {
        !cache.join("run-t1").exists()
    }

    #[tokio::test]
    async fn cuts_skips_and_joins() {
        let tmp = tempfile::tempdir().unwrap();
        let kit = Arc::new(FakeToolkit {
            duration: 30.0,
            ..Default::default()
        });
        let cfg = config(tmp.path(), vec![0.5, 10.0, 45.0, 29.5]);
        let (res, events) = run_engine(cfg, kit.clone()).await;
        let result = res.unwrap();

        let cuts = kit.cuts.lock().unwrap().clone();
        assert_eq!(cuts.len(), 3);
        assert_eq!((cuts[0].0.start, cuts[0].0.end), (0.0, 1.5));
        assert_eq!((cuts[1].0.start, cuts[1].0.end), (9.0, 11.0));
        assert_eq!((cuts[2].0.start, cuts[2].0.end), (28.5, 30.0));

        assert_eq!(result.clips_cut(), 3);
        assert_eq!(result.clips[2].status, ClipStatus::Skipped);
        assert_eq!(result.clips[3].status, ClipStatus::Cut { index: 2 });
        assert_eq!(result.merged_path, tmp.path().join("output_merged-t1.mp4"));
        assert!(result.merged_path.exists());

        let list = kit.concat_list.lock().unwrap().clone().unwrap();
        assert_eq!(list.lines().count(), 3);
        assert!(list.lines().next().unwrap().ends_with("clip_0.mp4'"));

        assert!(workspace_is_gone(tmp.path()));
        assert!(events
            .iter()
            .any(|e| matches!(e, JobEvent::ClipSkipped { position: 2, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, JobEvent::Info(InfoEvent::CleanedUp { removed: 4 }))));
    }

    #[tokio::test]
    async fn failed_clip_is_skipped_and_index_reused() {
        let tmp = tempfile::tempdir().unwrap();
        let kit = Arc::new(FakeToolkit {
            duration: 60.0,
            fail_at: vec![20.0],
            ..Default::default()
        });
        let (res, _) = run_engine(config(tmp.path(), vec![10.0, 20.0, 30.0]), kit.clone()).await;
        let result = res.unwrap();

        assert_eq!(result.clips_cut(), 2);
        assert!(matches!(result.clips[1].status, ClipStatus::Failed { .. }));
        assert_eq!(result.clips[2].status, ClipStatus::Cut { index: 1 });

        let cuts = kit.cuts.lock().unwrap().clone();
        assert_eq!(cuts[1].1, cuts[2].1);
        assert!(workspace_is_gone(tmp.path()));
    }

    #[tokio::test]
    async fn no_clips_is_an_error_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let kit = Arc::new(FakeToolkit {
            duration: 10.0,
            fail_at: vec![5.0],
            ..Default::default()
        });
        let (res, _) = run_engine(config(tmp.path(), vec![5.0, 50.0]), kit.clone()).await;
        let err = res.unwrap_err();
        assert_eq!(err.to_string(), "No valid clips could be generated.");
        assert!(kit.concat_list.lock().unwrap().is_none());
        assert!(workspace_is_gone(tmp.path()));
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let kit = Arc::new(FakeToolkit::default());
        let (res, _) = run_engine(config(tmp.path(), vec![1.0]), kit.clone()).await;
        assert_eq!(
            res.unwrap_err().to_string(),
            "Invalid video file or unable to read duration."
        );
        assert!(kit.cuts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn concat_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let kit = Arc::new(FakeToolkit {
            duration: 10.0,
            fail_concat: true,
            ..Default::default()
        });
        let (res, _) = run_engine(config(tmp.path(), vec![5.0]), kit).await;
        let err = res.unwrap_err();
        assert!(format!("{err:#}").contains("failed to join clips"));
        assert!(workspace_is_gone(tmp.path()));
    }

    #[tokio::test]
    async fn cancel_stops_after_current_clip() {
        let tmp = tempfile::tempdir().unwrap();
        let (ctrl_tx, ctrl_rx) = mpsc::unbounded_channel();
        let kit = Arc::new(FakeToolkit {
            duration: 60.0,
            cancel_on_cut: Some(ctrl_tx),
            ..Default::default()
        });
        let (evt_tx, _evt_rx) = mpsc::unbounded_channel();
        let res = HighlightEngine::new(config(tmp.path(), vec![5.0, 10.0]), kit.clone())
            .run(evt_tx, ctrl_rx)
            .await;

        let err = res.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::Cancelled)
        ));
        assert_eq!(kit.cuts.lock().unwrap().len(), 1);
        assert!(workspace_is_gone(tmp.path()));
    }

    #[tokio::test]
    async fn previous_merged_output_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = config(tmp.path(), vec![5.0]);
        let merged = HighlightEngine::merged_path(tmp.path(), "t1");
        std::fs::write(&merged, b"stale").unwrap();

        let kit = Arc::new(FakeToolkit {
            duration: 10.0,
            ..Default::default()
        });
        let (res, _) = run_engine(cfg, kit).await;
        res.unwrap();
        assert_eq!(std::fs::read(&merged).unwrap(), b"merged");
    }

    #[tokio::test]
    async fn relative_cache_dir_yields_absolute_concat_entries() {
        // A relative path below the working directory.
        let tmp = tempfile::Builder::new()
            .prefix("relative-cache-")
            .tempdir_in(".")
            .unwrap();
        let name = tmp.path().file_name().unwrap().to_owned();
        let relative = PathBuf::from(&name);
        assert!(relative.is_relative());

        let kit = Arc::new(FakeToolkit {
            duration: 10.0,
            ..Default::default()
        });
        let (res, _) = run_engine(config(&relative, vec![2.0, 6.0]), kit.clone()).await;
        let result = res.unwrap();

        assert!(result.merged_path.is_absolute());
        assert!(result.merged_path.exists());
        let list = kit.concat_list.lock().unwrap().clone().unwrap();
        for line in list.lines() {
            let entry = line
                .strip_prefix("file '")
                .and_then(|l| l.strip_suffix('\''))
                .unwrap();
            assert!(Path::new(entry).is_absolute(), "relative entry: {entry}");
        }
        for (_, out) in kit.cuts.lock().unwrap().iter() {
            assert!(out.is_absolute());
        }
    }
}

//! The external multimedia toolkit, behind a trait so the workflow can be driven without FFmpeg.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

use super::error::MediaResult;
use super::ffmpeg::{resolve_tool, FfmpegCommand, ProcessRunner};
use super::probe;
use crate::model::{ClipWindow, RunConfig};

/// Encoder settings for cut clips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            audio_codec: "aac".into(),
            preset: "ultrafast".into(),
        }
    }
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Duration of `source` in seconds.
    async fn probe_duration(&self, source: &Path) -> MediaResult<f64>;

    /// Cut `window` out of `source` into `output`.
    async fn cut_clip(
        &self,
        source: &Path,
        window: &ClipWindow,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;

    /// Join the clips named in `list_file` into `output` without re-encoding.
    async fn concat(
        &self,
        list_file: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()>;
}

/// FFmpeg / FFprobe binaries on the local machine.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    encode: EncodeSettings,
    timeout: Option<Duration>,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf, encode: EncodeSettings) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            encode,
            timeout: None,
        }
    }

    /// Locate both binaries for the given configuration.
    pub fn from_config(cfg: &RunConfig) -> MediaResult<Self> {
        let ffmpeg = resolve_tool(cfg.ffmpeg.as_deref(), "ffmpeg")?;
        let ffprobe = resolve_tool(cfg.ffprobe.as_deref(), "ffprobe")?;
        let encode = EncodeSettings {
            video_codec: cfg.video_codec.clone(),
            audio_codec: cfg.audio_codec.clone(),
            preset: cfg.preset.clone(),
        };
        Ok(Self::new(ffmpeg, ffprobe, encode).with_timeout(cfg.timeout))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ffprobe_runner(&self) -> ProcessRunner {
        ProcessRunner::new(&self.ffprobe).with_timeout(self.timeout)
    }

    fn ffmpeg_runner(&self, cancel: watch::Receiver<bool>) -> ProcessRunner {
        ProcessRunner::new(&self.ffmpeg)
            .with_cancel(cancel)
            .with_timeout(self.timeout)
    }

    /// Re-encode the cut so it starts exactly on the window instead of the nearest keyframe.
    pub fn cut_command(&self, source: &Path, window: &ClipWindow, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(source, output)
            .seek(window.start)
            .duration(window.duration())
            .video_codec(self.encode.video_codec.as_str())
            .preset(self.encode.preset.as_str())
            .audio_codec(self.encode.audio_codec.as_str())
    }

    pub fn concat_command(list_file: &Path, output: &Path) -> FfmpegCommand {
        // -safe 0 allows absolute paths in the list
        FfmpegCommand::new(list_file, output)
            .input_format("concat")
            .input_arg("-safe")
            .input_arg("0")
            .codec_copy()
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe_duration(&self, source: &Path) -> MediaResult<f64> {
        probe::probe_duration(&self.ffprobe_runner(), source).await
    }

    async fn cut_clip(
        &self,
        source: &Path,
        window: &ClipWindow,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let cmd = self.cut_command(source, window, output);
        self.ffmpeg_runner(cancel).run_ffmpeg(&cmd).await
    }

    async fn concat(
        &self,
        list_file: &Path,
        output: &Path,
        cancel: watch::Receiver<bool>,
    ) -> MediaResult<()> {
        let cmd = Self::concat_command(list_file, output);
        self.ffmpeg_runner(cancel).run_ffmpeg(&cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cmd: &FfmpegCommand) -> Vec<String> {
        cmd.build_args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn cut_command_substitutes_window_and_encoder() {
        let kit = FfmpegToolkit::new(
            "ffmpeg".into(),
            "ffprobe".into(),
            EncodeSettings {
                video_codec: "libx265".into(),
                audio_codec: "libopus".into(),
                preset: "fast".into(),
            },
        );
        let window = ClipWindow {
            timestamp: 5.5,
            start: 4.5,
            end: 6.5,
        };
        let a = args(&kit.cut_command(Path::new("/v/src.mp4"), &window, Path::new("/c/clip_3.mp4")));
        let joined = a.join(" ");
        assert!(joined.contains("-ss 4.500 -i /v/src.mp4 -t 2.000"));
        assert!(joined.contains("-c:v libx265 -preset fast -c:a libopus"));
        assert_eq!(a.last().unwrap(), "/c/clip_3.mp4");
    }

    #[test]
    fn default_encoder_matches_fast_accurate_cuts() {
        let e = EncodeSettings::default();
        assert_eq!(e.video_codec, "libx264");
        assert_eq!(e.preset, "ultrafast");
        assert_eq!(e.audio_codec, "aac");
    }

    #[test]
    fn concat_command_shape() {
        let a = args(&FfmpegToolkit::concat_command(
            Path::new("/c/concat_list.txt"),
            Path::new("/c/out.mp4"),
        ));
        assert!(a
            .join(" ")
            .ends_with("-f concat -safe 0 -i /c/concat_list.txt -c copy /c/out.mp4"));
    }
}

//! Moving the merged video out of the cache into its final location.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

/// `merged_video_YYYYMMDD_HHMMSS.mp4`, in local time when the offset is known.
pub(crate) fn default_output_name(now: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]_[hour][minute][second]");
    let stamp = now
        .format(&fmt)
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("merged_video_{stamp}.mp4")
}

pub(crate) fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Move `merged` to `explicit` or into `output_dir` under a timestamped name.
pub(crate) async fn persist_output(
    merged: &Path,
    output_dir: &Path,
    explicit: Option<&Path>,
) -> Result<PathBuf> {
    let dest = match explicit {
        Some(p) => p.to_path_buf(),
        None => output_dir.join(default_output_name(local_now())),
    };
    move_file(merged, &dest).await?;
    Ok(dest)
}

/// Rename, falling back to copy + delete when source and destination are on different filesystems.
pub(crate) async fn move_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    match tokio::fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            tracing::debug!(
                "Cross-device rename, copying instead: {} -> {}",
                src.display(),
                dst.display()
            );
            copy_and_delete(src, dst).await
        }
        Err(e) => Err(e).with_context(|| {
            format!("failed to move {} to {}", src.display(), dst.display())
        }),
    }
}

/// EXDEV on Linux and macOS.
#[cfg(not(windows))]
const CROSS_DEVICE_CODE: i32 = 18;
/// ERROR_NOT_SAME_DEVICE.
#[cfg(windows)]
const CROSS_DEVICE_CODE: i32 = 17;

fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(CROSS_DEVICE_CODE)
}

async fn copy_and_delete(src: &Path, dst: &Path) -> Result<()> {
    // Copy next to the destination first so the final rename is atomic.
    let tmp = dst.with_extension("part");
    tokio::fs::copy(src, &tmp)
        .await
        .with_context(|| format!("copy {} to {}", src.display(), tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, dst).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("rename {} to {}", tmp.display(), dst.display()));
    }
    tokio::fs::remove_file(src)
        .await
        .with_context(|| format!("remove {}", src.display()))?;
    Ok(())
}

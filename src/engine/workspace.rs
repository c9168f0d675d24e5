//! Per-run scratch directory for intermediate clips.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LIST_FILE_NAME: &str = "concat_list.txt";

pub struct ClipWorkspace {
    dir: PathBuf,
    files: Vec<PathBuf>,
}

impl ClipWorkspace {
    /// Create `<cache_dir>/run-<run_id>`.
    pub async fn create(cache_dir: &Path, run_id: &str) -> std::io::Result<Self> {
        let dir = cache_dir.join(format!("run-{run_id}"));
        tokio::fs::create_dir_all(&dir).await?;
        debug!("Workspace created at {}", dir.display());
        Ok(Self {
            dir,
            files: Vec::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for the clip at merged position `index`; registered for cleanup.
    pub fn clip_path(&mut self, index: usize) -> PathBuf {
        let p = self.dir.join(format!("clip_{index}.mp4"));
        self.track(p.clone());
        p
    }

    /// Path of the concat list file; registered for cleanup.
    pub fn list_path(&mut self) -> PathBuf {
        let p = self.dir.join(LIST_FILE_NAME);
        self.track(p.clone());
        p
    }

    fn track(&mut self, p: PathBuf) {
        if !self.files.contains(&p) {
            self.files.push(p);
        }
    }

    /// Delete every registered file and the directory itself when it ends up empty.
    /// Returns how many files were actually removed.
    pub async fn cleanup(self) -> usize {
        let mut removed = 0;
        for f in &self.files {
            match tokio::fs::remove_file(f).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", f.display(), e),
            }
        }
        // Fails while something unexpected is still inside; leave it for inspection.
        if let Err(e) = tokio::fs::remove_dir(&self.dir).await {
            if e.kind() != ErrorKind::NotFound {
                debug!("Workspace {} not removed: {}", self.dir.display(), e);
            }
        }
        removed
    }
}

use crate::model::RunResult;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "highlight-clipper";

/// Base directory for persisted data (`~/.local/share/highlight-clipper` on Linux).
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().context("could not determine data directory")?;
    Ok(base.join(APP_DIR))
}

/// Scratch directory for in-flight clips.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Default directory for merged videos.
pub fn default_output_dir() -> Result<PathBuf> {
    data_dir()
}

fn runs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("runs"))
}

/// File name used for a run record, sortable by time.
pub fn run_file_name(r: &RunResult) -> String {
    let ts = r.timestamp_utc.replace(':', "-");
    format!("run-{}-{}.json", ts, r.run_id)
}

pub fn save_run(r: &RunResult) -> Result<PathBuf> {
    save_run_in(&runs_dir()?, r)
}

pub(crate) fn save_run_in(dir: &Path, r: &RunResult) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let path = dir.join(run_file_name(r));
    let json = serde_json::to_vec_pretty(r)?;
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Load up to `limit` most recent runs, newest first.
pub fn load_recent(limit: usize) -> Result<Vec<RunResult>> {
    load_recent_in(&runs_dir()?, limit)
}

pub(crate) fn load_recent_in(dir: &Path, limit: usize) -> Result<Vec<RunResult>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("read {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "json"))
        .collect();
    // RFC 3339 timestamps in the name sort chronologically.
    files.sort();
    files.reverse();

    let mut out = Vec::new();
    for p in files {
        if out.len() >= limit {
            break;
        }
        let Ok(data) = std::fs::read(&p) else {
            continue;
        };
        match serde_json::from_slice::<RunResult>(&data) {
            Ok(r) => out.push(r),
            Err(e) => tracing::debug!("Skipping unreadable run {}: {}", p.display(), e),
        }
    }
    Ok(out)
}

pub fn export_json(path: &Path, r: &RunResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(r)?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

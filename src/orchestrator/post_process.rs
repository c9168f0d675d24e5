//! Post-run processing utilities.
//!
//! Handles persisting the merged video, auto-save and exports after a run completes.

use super::persist::persist_output;
use crate::cli::Cli;
use crate::model::RunResult;
use crate::storage;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Result of post-run processing, ready for presentation layers.
pub(crate) struct ProcessedRun {
    pub result: RunResult,
    pub messages: Vec<String>,
    pub auto_saved_path: Option<PathBuf>,
}

/// Process a completed run: move the merged video into place, auto-save, export.
///
/// Failing to place the video is an error; history and export failures only produce messages.
pub(crate) async fn process_run_completion(args: &Cli, run: RunResult) -> Result<ProcessedRun> {
    let output_dir = match args.output_dir.clone() {
        Some(d) => d,
        None => storage::default_output_dir()?,
    };

    let dest = persist_output(&run.merged_path, &output_dir, args.output.as_deref())
        .await
        .context("failed to save merged video")?;
    tracing::info!("Merged video saved to {}", dest.display());

    let mut result = run;
    result.output_path = Some(dest.clone());

    let mut messages = vec![format!("Saved video: {}", dest.display())];

    let auto_saved_path = if args.auto_save {
        match storage::save_run(&result) {
            Ok(p) => Some(p),
            Err(e) => {
                messages.push(format!("Saving run history failed: {e:#}"));
                None
            }
        }
    } else {
        None
    };

    if let Some(export_path) = args.export_json.as_deref() {
        match storage::export_json(export_path, &result) {
            Ok(()) => messages.push(format!("Exported JSON: {}", export_path.display())),
            Err(e) => messages.push(format!("Export JSON failed: {e:#}")),
        }
    }

    Ok(ProcessedRun {
        result,
        messages,
        auto_saved_path,
    })
}

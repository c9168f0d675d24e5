//! Concat demuxer list files.

use std::path::{Path, PathBuf};

/// Render the concat demuxer list: one `file '<path>'` line per clip.
pub fn concat_list(clips: &[PathBuf]) -> String {
    let mut out = String::new();
    for clip in clips {
        out.push_str("file '");
        out.push_str(&escape_quoted(&clip.to_string_lossy()));
        out.push_str("'\n");
    }
    out
}

/// Inside single quotes the demuxer only understands `'\''` for a literal quote.
fn escape_quoted(path: &str) -> String {
    path.replace('\'', r"'\''")
}

pub async fn write_concat_list(list_path: &Path, clips: &[PathBuf]) -> std::io::Result<()> {
    tokio::fs::write(list_path, concat_list(clips)).await
}

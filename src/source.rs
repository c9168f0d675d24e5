//! Input handling: source path normalization and timestamp parsing.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Turn user input into an absolute path of a readable, non-empty file.
///
/// Accepts plain paths, `~/` paths and `file://` URIs. Other URI schemes are
/// rejected since FFmpeg is handed a local file.
pub fn normalize_source(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("No video selected. Please pass a video file.");
    }

    let path = if let Some(rest) = raw.strip_prefix("file://") {
        file_uri_path(rest)?
    } else if let Some(scheme) = uri_scheme(raw) {
        bail!(
            "Unsupported location '{scheme}://'; copy the video to a local file first"
        );
    } else {
        expand_home(raw)?
    };

    let canonical = std::fs::canonicalize(&path)
        .with_context(|| format!("Video file not found: {}", path.display()))?;
    let meta = std::fs::metadata(&canonical)
        .with_context(|| format!("Cannot read file: {}", canonical.display()))?;
    if !meta.is_file() {
        bail!("Not a regular file: {}", canonical.display());
    }
    if meta.len() == 0 {
        bail!("File is empty: {}", canonical.display());
    }
    Ok(canonical)
}

/// `scheme` of `scheme://...` when it looks like a URI rather than a path.
fn uri_scheme(s: &str) -> Option<&str> {
    let (scheme, _) = s.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme.len() > 1 // `C://` style drive letters are paths
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

fn expand_home(raw: &str) -> Result<PathBuf> {
    if raw == "~" || raw.starts_with("~/") {
        let home = dirs::home_dir().context("could not determine home directory")?;
        return Ok(match raw.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None => home,
        });
    }
    Ok(Path::new(raw).to_path_buf())
}

/// Local path of a `file://` URI, given the part after the scheme.
///
/// Only `file:///path` and `file://localhost/path` name a local file.
fn file_uri_path(rest: &str) -> Result<PathBuf> {
    let path = match rest.find('/') {
        Some(0) => rest,
        Some(i) if rest[..i].eq_ignore_ascii_case("localhost") => &rest[i..],
        Some(i) => bail!(
            "Unsupported file URI host '{}'; only local files can be read",
            &rest[..i]
        ),
        None => bail!("File URI has no path: file://{rest}"),
    };
    let decoded = percent_encoding::percent_decode_str(path)
        .decode_utf8()
        .context("file URI is not valid UTF-8")?;
    Ok(PathBuf::from(decoded.into_owned()))
}

/// Parse a comma-separated list of timestamps.
///
/// Entries are seconds (`12.5`) or clock time (`1:03`, `01:02:03.5`). Entries that
/// do not parse are skipped with a warning; an error is returned only when none remain.
pub fn parse_timestamps(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match parse_timestamp(part) {
            Some(ts) => out.push(ts),
            None => warn!("Ignoring invalid timestamp '{}'", part),
        }
    }
    if out.is_empty() {
        bail!("Please enter valid comma-separated timestamps.");
    }
    Ok(out)
}

/// Seconds from `ss`, `mm:ss` or `hh:mm:ss` (fractions allowed on the last field).
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() > 3 {
        return None;
    }
    let (last, rest) = fields.split_last()?;
    let mut secs: f64 = last.trim().parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    if !rest.is_empty() && secs >= 60.0 {
        return None;
    }
    let mut scale = 60.0;
    for (n, field) in rest.iter().rev().enumerate() {
        let v: u32 = field.trim().parse().ok()?;
        // minutes must be < 60 when hours are present
        if n == 0 && rest.len() == 2 && v >= 60 {
            return None;
        }
        secs += f64::from(v) * scale;
        scale *= 60.0;
    }
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds_and_skips_junk() {
        let ts = parse_timestamps(" 5, 12.5,,abc, 30 ,-3").unwrap();
        assert_eq!(ts, vec![5.0, 12.5, 30.0]);
    }

    #[test]
    fn keeps_order_and_duplicates() {
        assert_eq!(parse_timestamps("9,3,9").unwrap(), vec![9.0, 3.0, 9.0]);
    }

    #[test]
    fn empty_or_all_invalid_is_error() {
        for input in ["", " , ,", "x,y", "NaN,inf"] {
            let err = parse_timestamps(input).unwrap_err();
            assert_eq!(err.to_string(), "Please enter valid comma-separated timestamps.");
        }
    }

    #[test]
    fn clock_forms() {
        assert_eq!(parse_timestamp("1:03"), Some(63.0));
        assert_eq!(parse_timestamp("01:02:03.5"), Some(3723.5));
        assert_eq!(parse_timestamp("0:00"), Some(0.0));
        assert_eq!(parse_timestamp("1:75"), None);
        assert_eq!(parse_timestamp("1:75:00"), None);
        assert_eq!(parse_timestamp("1:2:3:4"), None);
        assert_eq!(parse_timestamp("a:10"), None);
    }

    #[test]
    fn rejects_non_file_uris() {
        let err = normalize_source("content://media/external/video/42").unwrap_err();
        assert!(err.to_string().contains("content://"));
        assert!(normalize_source("   ").is_err());
    }

    #[test]
    fn resolves_file_uri_with_escapes() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("my clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let uri = format!("file://{}", file.display()).replace(' ', "%20");
        let got = normalize_source(&uri).unwrap();
        assert_eq!(got, std::fs::canonicalize(&file).unwrap());
    }

    #[test]
    fn rejects_missing_empty_and_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.mp4");
        assert!(normalize_source(missing.to_str().unwrap())
            .unwrap_err()
            .to_string()
            .contains("not found"));

        let empty = tmp.path().join("empty.mp4");
        std::fs::write(&empty, b"").unwrap();
        assert!(normalize_source(empty.to_str().unwrap())
            .unwrap_err()
            .to_string()
            .contains("empty"));

        assert!(normalize_source(tmp.path().to_str().unwrap())
            .unwrap_err()
            .to_string()
            .contains("Not a regular file"));
    }

    #[test]
    fn file_uri_decoding_and_hosts() {
        assert_eq!(file_uri_path("/a%2Fb%20c").unwrap(), PathBuf::from("/a/b c"));
        assert_eq!(file_uri_path("localhost/v.mp4").unwrap(), PathBuf::from("/v.mp4"));
        assert_eq!(file_uri_path("LOCALHOST/v.mp4").unwrap(), PathBuf::from("/v.mp4"));
        assert!(file_uri_path("/a%FF.mp4")
            .unwrap_err()
            .to_string()
            .contains("not valid UTF-8"));
        assert!(file_uri_path("localhost").is_err());
    }

    #[test]
    fn remote_file_uri_host_is_rejected() {
        let err = normalize_source("file://otherhost/videos/a.mp4").unwrap_err();
        assert!(err.to_string().contains("Unsupported file URI host 'otherhost'"));
        assert!(normalize_source("file://nas.local/share/a.mp4").is_err());
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_home("~/x").unwrap(), home.join("x"));
        assert_eq!(expand_home("~/a/b.mp4").unwrap(), home.join("a/b.mp4"));
        assert_eq!(expand_home("~").unwrap(), home);
        assert_eq!(expand_home("~user/x").unwrap(), PathBuf::from("~user/x"));
        assert_eq!(expand_home("clips/x.mp4").unwrap(), PathBuf::from("clips/x.mp4"));
    }
}

//! Utility functions for file names and diagnostics

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

/// How long a `--version` style query may run
const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest file name stem produced by [`safe_filename`], in characters
pub const MAX_FILENAME_CHARS: usize = 120;

/// Turn a media title into a file name stem that is safe on every platform
///
/// Path separators and characters reserved on Windows are replaced with `_`,
/// control characters are dropped, runs of whitespace collapse to one space,
/// and the result is truncated to [`MAX_FILENAME_CHARS`] characters. Leading
/// and trailing dots and spaces are stripped so the name can never be `.` or
/// `..`. Returns `"media"` if nothing usable is left.
///
/// # Examples
///
/// ```
/// use media_relay::utils::safe_filename;
///
/// assert_eq!(safe_filename("AC/DC - Back in   Black"), "AC_DC - Back in Black");
/// assert_eq!(safe_filename("..."), "media");
/// ```
pub fn safe_filename(title: &str) -> String {
    let mut out = String::with_capacity(title.len().min(MAX_FILENAME_CHARS));
    let mut last_was_space = false;

    for c in title.chars() {
        let mapped = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => ' ',
            c if c.is_control() => continue,
            c => c,
        };
        if mapped == ' ' {
            if last_was_space {
                continue;
            }
            last_was_space = true;
        } else {
            last_was_space = false;
        }
        out.push(mapped);
    }

    let truncated: String = out.chars().take(MAX_FILENAME_CHARS).collect();
    let trimmed = truncated.trim_matches(|c: char| c == '.' || c == ' ');
    if trimmed.is_empty() {
        "media".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Keep at most the last `max_bytes` bytes of `text`, never splitting a UTF-8 character
///
/// Used to turn a transcoder's stderr into a bounded diagnostic. Surrounding
/// whitespace is trimmed.
pub fn tail_utf8(text: &str, max_bytes: usize) -> String {
    let text = text.trim();
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].trim_start().to_string()
}

/// First line a binary prints for its version flag
///
/// `None` if it cannot be started, exits non-zero, prints nothing or takes
/// longer than ten seconds.
pub async fn binary_version(binary: &Path, flag: &str) -> Option<String> {
    let query = tokio::process::Command::new(binary)
        .arg(flag)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(VERSION_QUERY_TIMEOUT, query).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            tracing::debug!(?binary, status = %output.status, "version query failed");
            return None;
        }
        Ok(Err(e)) => {
            tracing::debug!(?binary, error = %e, "version query could not start");
            return None;
        }
        Err(_) => {
            tracing::warn!(?binary, "version query timed out");
            return None;
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Derive a human-readable title from the last path segment of a URL
///
/// The extension is removed. Falls back to the host name, then to `"media"`.
pub fn title_from_url(url: &str) -> String {
    let Ok(parsed) = url::Url::parse(url) else {
        return "media".to_string();
    };

    if let Some(mut segments) = parsed.path_segments()
        && let Some(last_segment) = segments.next_back()
        && !last_segment.is_empty()
    {
        if let Some(stem) = std::path::Path::new(last_segment).file_stem()
            && let Some(stem_str) = stem.to_str()
        {
            return stem_str.to_string();
        }
        return last_segment.to_string();
    }

    parsed
        .host_str()
        .map(str::to_string)
        .unwrap_or_else(|| "media".to_string())
}

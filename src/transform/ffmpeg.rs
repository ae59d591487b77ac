//! ffmpeg-based transcoder

use super::traits::{TransformCapabilities, Transcoder};
use crate::config::TransformConfig;
use crate::error::TransformError;
use crate::utils::{binary_version, tail_utf8};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Transcoder that runs an external `ffmpeg` binary
///
/// Runs `ffmpeg -y -i <in> -vn -acodec <codec> -b:a <bitrate> <out>`. The
/// process is killed if it outlives the configured timeout or if the job is
/// cancelled (the future is dropped).
///
/// # Examples
///
/// ```no_run
/// use media_relay::config::TransformConfig;
/// use media_relay::transform::FfmpegTranscoder;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let transcoder = FfmpegTranscoder::new(PathBuf::from("/usr/bin/ffmpeg"), &TransformConfig::default());
///
/// // Or auto-discover from PATH
/// let transcoder = FfmpegTranscoder::from_path(&TransformConfig::default())
///     .expect("ffmpeg not found in PATH");
/// ```
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    binary_path: PathBuf,
    audio_codec: String,
    audio_bitrate: String,
    timeout: Duration,
    diagnostic_tail_bytes: usize,
}

impl FfmpegTranscoder {
    /// Create a transcoder with an explicit binary path
    pub fn new(binary_path: PathBuf, config: &TransformConfig) -> Self {
        Self {
            binary_path,
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
            timeout: config.timeout,
            diagnostic_tail_bytes: config.diagnostic_tail_bytes,
        }
    }

    /// Attempt to find ffmpeg in PATH
    ///
    /// Uses the `which` crate to search for the `ffmpeg` binary.
    pub fn from_path(config: &TransformConfig) -> Option<Self> {
        which::which("ffmpeg")
            .ok()
            .map(|path| Self::new(path, config))
    }

    /// Path of the binary this transcoder runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command-line arguments for one conversion
    pub fn args(&self, input: &Path, output: &Path) -> Vec<std::ffi::OsString> {
        vec![
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vn".into(),
            "-acodec".into(),
            self.audio_codec.clone().into(),
            "-b:a".into(),
            self.audio_bitrate.clone().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transform(&self, input: &Path, output: &Path) -> Result<(), TransformError> {
        debug!(binary = ?self.binary_path, ?input, ?output, "starting transcoder");

        let child = Command::new(&self.binary_path)
            .args(self.args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransformError::Spawn {
                binary: self.binary_path.clone(),
                reason: e.to_string(),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TransformError::Spawn {
                    binary: self.binary_path.clone(),
                    reason: format!("failed waiting for process: {e}"),
                });
            }
            Err(_) => return Err(TransformError::Timeout(self.timeout)),
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(TransformError::Failed {
            exit_code: output.status.code(),
            diagnostic: tail_utf8(&stderr, self.diagnostic_tail_bytes),
        })
    }

    fn capabilities(&self) -> TransformCapabilities {
        TransformCapabilities {
            can_transform: true,
        }
    }

    async fn version(&self) -> Option<String> {
        binary_version(&self.binary_path, "-version").await
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> TransformConfig {
        TransformConfig::default()
    }

    #[test]
    fn args_follow_the_ffmpeg_convention() {
        let transcoder = FfmpegTranscoder::new(PathBuf::from("/usr/bin/ffmpeg"), &config());
        let args: Vec<String> = transcoder
            .args(Path::new("/tmp/job/in.webm"), Path::new("/tmp/job/out.mp3"))
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            [
                "-y",
                "-i",
                "/tmp/job/in.webm",
                "-vn",
                "-acodec",
                "libmp3lame",
                "-b:a",
                "192k",
                "/tmp/job/out.mp3"
            ]
        );
    }

    #[test]
    fn test_from_path_consistency_with_which_crate() {
        let which_result = which::which("ffmpeg");
        let from_path_result = FfmpegTranscoder::from_path(&config());
        assert_eq!(which_result.is_ok(), from_path_result.is_some());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let transcoder = FfmpegTranscoder::new(PathBuf::from("/nonexistent/ffmpeg-xyz"), &config());
        let err = transcoder
            .transform(Path::new("in.webm"), Path::new("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Spawn { .. }));
    }

    /// Write an executable shell script standing in for ffmpeg
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn version_is_the_first_line_of_dash_version() {
        let dir = TempDir::new().unwrap();
        let binary = fake_ffmpeg(
            dir.path(),
            r#"[ "$1" = "-version" ] || exit 1
echo "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers"
echo "built with gcc 13""#,
        );

        assert_eq!(
            FfmpegTranscoder::new(binary, &config()).version().await.as_deref(),
            Some("ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers")
        );
        let missing = FfmpegTranscoder::new(PathBuf::from("/nonexistent/ffmpeg-xyz"), &config());
        assert_eq!(missing.version().await, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn success_writes_output() {
        let dir = TempDir::new().unwrap();
        // $3 is the input, $9 the output
        let binary = fake_ffmpeg(dir.path(), r#"cp "$3" "$9""#);
        let input = dir.path().join("in.webm");
        let output = dir.path().join("out.mp3");
        std::fs::write(&input, b"audio").unwrap();

        FfmpegTranscoder::new(binary, &config())
            .transform(&input, &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"audio");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_exit_code_and_stderr_tail() {
        let dir = TempDir::new().unwrap();
        let binary = fake_ffmpeg(
            dir.path(),
            r#"i=0; while [ $i -lt 100 ]; do echo "frame $i: noise" >&2; i=$((i+1)); done
echo "in.webm: Invalid data found when processing input" >&2
exit 3"#,
        );

        let err = FfmpegTranscoder::new(binary, &config())
            .transform(&dir.path().join("in.webm"), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();

        match err {
            TransformError::Failed {
                exit_code,
                diagnostic,
            } => {
                assert_eq!(exit_code, Some(3));
                assert!(diagnostic.len() <= 500);
                assert!(diagnostic.ends_with("Invalid data found when processing input"));
                assert!(!diagnostic.contains("frame 0:"));
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_process_times_out() {
        let dir = TempDir::new().unwrap();
        let binary = fake_ffmpeg(dir.path(), "sleep 10");
        let config = TransformConfig {
            timeout: Duration::from_millis(200),
            ..config()
        };

        let err = FfmpegTranscoder::new(binary, &config)
            .transform(&dir.path().join("in.webm"), &dir.path().join("out.mp3"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Timeout(d) if d == Duration::from_millis(200)));
    }
}

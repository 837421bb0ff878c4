use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

use crate::logging::Logger;
use crate::stations::StationId;

const STDERR_TAIL_CHARS: usize = 400;
const DEFAULT_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordingJob {
    pub id: StationId,
    pub url: String,
    pub duration: Duration,
    #[serde(rename = "outputDir")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("failed to prepare {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start encoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("encoder failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },
    #[error("encoder still running after {limit:?}; killed")]
    TimedOut { limit: Duration },
}

/// External collaborator that captures `duration` of audio from a stream.
/// Any failure is opaque to the scheduler.
#[async_trait]
pub trait RecordingInvoker: Send + Sync {
    async fn record(&self, job: &RecordingJob) -> Result<PathBuf, RecordError>;
}

/// Records through an `ffmpeg` child process, transcoding to 128k MP3.
///
/// A run may take at most the job duration plus `grace`; past that the
/// child is killed and the attempt counts as failed.
#[derive(Clone)]
pub struct FfmpegRecorder {
    binary: String,
    grace: Duration,
    logger: Logger,
}

impl FfmpegRecorder {
    pub fn new(binary: impl Into<String>, logger: Logger) -> Self {
        Self {
            binary: binary.into(),
            grace: DEFAULT_GRACE,
            logger,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn command(&self, job: &RecordingJob, out_file: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-y")
            .arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-i")
            .arg(&job.url)
            .arg("-t")
            .arg(job.duration.as_secs().max(1).to_string())
            .arg("-c:a")
            .arg("libmp3lame")
            .arg("-b:a")
            .arg("128k")
            .arg(out_file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl RecordingInvoker for FfmpegRecorder {
    async fn record(&self, job: &RecordingJob) -> Result<PathBuf, RecordError> {
        tokio::fs::create_dir_all(&job.output_dir)
            .await
            .map_err(|source| RecordError::OutputDir {
                path: job.output_dir.clone(),
                source,
            })?;
        let out_file = job.output_dir.join(output_file_name(&job.id));

        self.logger.info(
            "record.started",
            json!({
                "stationId": job.id,
                "url": job.url,
                "seconds": job.duration.as_secs(),
                "output": out_file.display().to_string(),
            }),
        );

        let limit = job.duration + self.grace;
        let output = match timeout(limit, self.command(job, &out_file).output()).await {
            Ok(result) => result.map_err(RecordError::Spawn)?,
            Err(_) => {
                self.logger.warn(
                    "record.timed_out",
                    json!({ "stationId": job.id, "limitSeconds": limit.as_secs() }),
                );
                return Err(RecordError::TimedOut { limit });
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecordError::Failed {
                status: output.status.to_string(),
                stderr: tail(stderr.trim(), STDERR_TAIL_CHARS),
            });
        }
        Ok(out_file)
    }
}

/// `<station>_<UTC timestamp>.mp3`, with the station id reduced to
/// filesystem-safe characters.
pub fn output_file_name(id: &str) -> String {
    let safe: String = id
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let safe = if safe.is_empty() { "radio".to_string() } else { safe };
    format!("{}_{}.mp3", safe, Utc::now().format("%Y%m%d_%H%M%S"))
}

fn tail(value: &str, max: usize) -> String {
    let count = value.chars().count();
    if count <= max {
        return value.to_string();
    }
    value.chars().skip(count - max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_name_is_sanitized_and_timestamped() {
        let name = output_file_name("Radio Sawa/FM-riyadh-SA");
        assert!(name.starts_with("Radio_Sawa_FM-riyadh-SA_"));
        assert!(name.ends_with(".mp3"));
        // _YYYYmmdd_HHMMSS.mp3
        assert_eq!(name.len(), "Radio_Sawa_FM-riyadh-SA".len() + 20);
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = FfmpegRecorder::new("/nonexistent/ffmpeg-binary", Logger::silent());
        let job = RecordingJob {
            id: "x-riyadh-SA".into(),
            url: "http://127.0.0.1:9/live".into(),
            duration: Duration::from_secs(1),
            output_dir: dir.path().join("riyadh"),
        };

        let result = recorder.record(&job).await;

        assert!(matches!(result, Err(RecordError::Spawn(_))));
        assert!(dir.path().join("riyadh").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stalled_encoder_is_killed_after_duration_and_grace() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("stalled-ffmpeg");
        std::fs::write(&binary, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let recorder = FfmpegRecorder::new(binary.display().to_string(), Logger::silent())
            .with_grace(Duration::from_millis(200));
        let job = RecordingJob {
            id: "x-riyadh-SA".into(),
            url: "http://127.0.0.1:9/live".into(),
            duration: Duration::from_secs(1),
            output_dir: dir.path().join("riyadh"),
        };

        let started = std::time::Instant::now();
        let result = recorder.record(&job).await;

        match result {
            Err(RecordError::TimedOut { limit }) => {
                assert_eq!(limit, Duration::from_millis(1200))
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}

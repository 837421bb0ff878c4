use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const HEADER: [&str; 4] = [
    "Sound filename",
    "Duration (seconds)",
    "Time recorded",
    "City",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingLogEntry {
    pub filename: String,
    pub duration_seconds: u64,
    pub recorded_at: DateTime<Utc>,
    pub city: String,
}

/// Append-only CSV sink with one row per successful recording.
#[derive(Debug, Clone)]
pub struct RecordingLog {
    path: PathBuf,
}

impl RecordingLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, entry: &RecordingLogEntry) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let write_header = !fs::try_exists(&self.path).await.unwrap_or(false);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let mut buffer = String::new();
        if write_header {
            buffer.push_str(&csv_row(&HEADER));
        }
        let duration = entry.duration_seconds.to_string();
        let recorded_at = entry
            .recorded_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        buffer.push_str(&csv_row(&[
            entry.filename.as_str(),
            duration.as_str(),
            recorded_at.as_str(),
            entry.city.as_str(),
        ]));

        file.write_all(buffer.as_bytes()).await?;
        file.flush().await
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|field| csv_field(field))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str("\r\n");
    row
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

//! Where finished page results go. Every result is appended the moment its
//! page finishes; nothing is held back for the end of the batch.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::SubmissionResult;

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, result: &SubmissionResult) -> Result<()>;
}

/// Appends one JSON object per line and syncs after each write, so a killed
/// run keeps every page that already finished.
pub struct JsonlRecorder {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlRecorder {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Sink(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back a results file. A torn last line (interrupted write) is
    /// skipped.
    pub async fn read_all(path: impl AsRef<Path>) -> Result<Vec<SubmissionResult>> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let mut results = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(result) => results.push(result),
                Err(e) => warn!(line = lineno + 1, error = %e, "skipping unreadable result line"),
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl ResultSink for JsonlRecorder {
    async fn append(&self, result: &SubmissionResult) -> Result<()> {
        let mut line = serde_json::to_vec(result)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// Keeps results in memory, in append order.
#[derive(Default)]
pub struct MemorySink {
    results: Mutex<Vec<SubmissionResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<SubmissionResult> {
        self.results
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn append(&self, result: &SubmissionResult) -> Result<()> {
        let mut results = self
            .results
            .lock()
            .map_err(|_| Error::Sink("memory sink poisoned".into()))?;
        results.push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PageStatus;
    use chrono::Utc;

    #[tokio::test]
    async fn appends_one_line_per_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let recorder = JsonlRecorder::open(&path).await.unwrap();

        let started = Utc::now();
        recorder
            .append(&SubmissionResult::new("https://a.example", PageStatus::Success, "submitted", started))
            .await
            .unwrap();
        recorder
            .append(&SubmissionResult::error("https://b.example", "navigation failed", started))
            .await
            .unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(raw.lines().count(), 2);

        let back = JsonlRecorder::read_all(&path).await.unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].url, "https://a.example");
        assert_eq!(back[1].status, PageStatus::Error);
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        {
            let recorder = JsonlRecorder::open(&path).await.unwrap();
            recorder
                .append(&SubmissionResult::error("https://a.example", "boom", Utc::now()))
                .await
                .unwrap();
        }
        let mut file = tokio::fs::OpenOptions::new().append(true).open(&path).await.unwrap();
        file.write_all(b"{\"url\":\"https://b.ex").await.unwrap();
        file.flush().await.unwrap();

        let back = JsonlRecorder::read_all(&path).await.unwrap();
        assert_eq!(back.len(), 1);
    }
}

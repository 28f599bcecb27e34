//! # Output Sinks
//!
//! Where stage artifacts, raw event logs and the usage report end up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::io::{
    self, CRITIQUE_FILE, FINAL_REPORT_FILE, RESEARCH_JSON_FILE, RESEARCH_TEXT_FILE,
    TOKEN_USAGE_FILE,
};
use crate::usage::{OperationTag, UsageReport};
use crate::workflow::{RawLogEntry, StageKind};

/// A completed stage's output, ready to persist
#[derive(Debug, Clone)]
pub struct StageArtifact {
    pub stage: StageKind,
    pub query: String,
    pub content: String,
    /// Rendered token usage section appended after the content
    pub usage_summary: String,
    /// Usage report at the time the stage completed
    pub usage_report: Value,
}

impl StageArtifact {
    /// Content followed by the usage section
    pub fn body(&self) -> String {
        if self.usage_summary.is_empty() {
            self.content.clone()
        } else {
            format!("{}\n\n{}", self.content, self.usage_summary)
        }
    }
}

/// Durable destination for run outputs
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist a stage's artifact
    async fn persist(&self, artifact: &StageArtifact) -> Result<()>;

    /// Read back a stage's artifact written by an earlier run
    async fn read(&self, stage: StageKind) -> Result<Option<String>>;

    /// Persist the raw event log of one operation
    async fn persist_raw_events(
        &self,
        operation: OperationTag,
        entries: &[RawLogEntry],
    ) -> Result<()>;

    /// Persist the run's usage report
    async fn persist_usage_report(&self, report: &UsageReport) -> Result<()>;
}

/// Sink writing into a results directory
#[derive(Debug, Clone)]
pub struct FileOutputSink {
    dir: PathBuf,
}

impl FileOutputSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink over `VERITAS_RESULTS_DIR` or `./results`
    pub fn from_env() -> Self {
        Self::new(io::get_results_path())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stage_file(&self, stage: StageKind) -> PathBuf {
        let name = match stage {
            StageKind::Research => RESEARCH_TEXT_FILE,
            StageKind::Critique => CRITIQUE_FILE,
            StageKind::FinalReport => FINAL_REPORT_FILE,
        };
        self.dir.join(name)
    }

    /// Merge stage fields into `research_results.json`.
    ///
    /// Research rewrites the document; later stages only update it if it
    /// already exists.
    async fn update_json(&self, artifact: &StageArtifact) -> Result<()> {
        let path = self.dir.join(RESEARCH_JSON_FILE);
        let body = artifact.body();
        let now = Utc::now().to_rfc3339();

        let doc = match artifact.stage {
            StageKind::Research => json!({
                "query": artifact.query,
                "timestamp": now,
                "content": body,
                "token_usage": artifact.usage_report,
            }),
            stage => {
                let Some(existing) = io::read_optional(&path).await? else {
                    return Ok(());
                };
                let mut doc: Value = serde_json::from_str(&existing)
                    .with_context(|| format!("Failed to parse {:?}", path))?;
                if let Some(map) = doc.as_object_mut() {
                    map.insert(stage.as_str().to_string(), Value::String(body));
                    map.insert(format!("{}_timestamp", stage), Value::String(now));
                    map.insert("token_usage".to_string(), artifact.usage_report.clone());
                }
                doc
            }
        };

        io::write_file(&path, &serde_json::to_string_pretty(&doc)?).await
    }
}

#[async_trait]
impl OutputSink for FileOutputSink {
    async fn persist(&self, artifact: &StageArtifact) -> Result<()> {
        io::ensure_dir(&self.dir).await?;
        let now = Local::now();
        let header = match artifact.stage {
            StageKind::Research => io::file_header("Research Query", &artifact.query, now),
            StageKind::Critique => io::file_header("Critique for Query", &artifact.query, now),
            StageKind::FinalReport => io::report_header(&artifact.query, now),
        };

        let path = self.stage_file(artifact.stage);
        io::write_file(&path, &format!("{}{}", header, artifact.body())).await?;
        self.update_json(artifact).await?;

        tracing::info!(stage = %artifact.stage, path = ?path, "Saved stage results");
        Ok(())
    }

    async fn read(&self, stage: StageKind) -> Result<Option<String>> {
        io::read_optional(&self.stage_file(stage)).await
    }

    async fn persist_raw_events(
        &self,
        operation: OperationTag,
        entries: &[RawLogEntry],
    ) -> Result<()> {
        let path = self.dir.join(operation.raw_log_file());
        io::write_file(&path, &serde_json::to_string_pretty(entries)?).await?;
        tracing::debug!(operation = %operation, count = entries.len(), "Saved raw events");
        Ok(())
    }

    async fn persist_usage_report(&self, report: &UsageReport) -> Result<()> {
        let path = self.dir.join(TOKEN_USAGE_FILE);
        io::write_file(&path, &serde_json::to_string_pretty(report)?).await
    }
}


#[cfg(test)]
pub use memory::MemoryOutputSink;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageAggregator;

    fn artifact(stage: StageKind, content: &str) -> StageArtifact {
        StageArtifact {
            stage,
            query: "Is it HIPAA compliant?".into(),
            content: content.into(),
            usage_summary: "## Token Usage Statistics".into(),
            usage_report: json!({"total_usage": {"total_tokens": 10}}),
        }
    }

    #[tokio::test]
    async fn test_file_sink_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileOutputSink::new(dir.path());

        sink.persist(&artifact(StageKind::Research, "findings")).await.unwrap();
        sink.persist(&artifact(StageKind::Critique, "gaps")).await.unwrap();
        sink.persist(&artifact(StageKind::FinalReport, "report")).await.unwrap();

        let research = sink.read(StageKind::Research).await.unwrap().unwrap();
        assert!(research.starts_with("Research Query: Is it HIPAA compliant?\n"));
        assert!(research.contains("findings\n\n## Token Usage Statistics"));

        let critique = sink.read(StageKind::Critique).await.unwrap().unwrap();
        assert!(critique.starts_with("Critique for Query:"));

        let report = tokio::fs::read_to_string(dir.path().join(FINAL_REPORT_FILE))
            .await
            .unwrap();
        assert!(report.starts_with("# Final Research Report"));

        let json: Value = serde_json::from_str(
            &tokio::fs::read_to_string(dir.path().join(RESEARCH_JSON_FILE))
                .await
                .unwrap(),
        )
        .unwrap();
        assert_eq!(json["query"], "Is it HIPAA compliant?");
        assert!(json["critique"].as_str().unwrap().starts_with("gaps"));
        assert!(json["final_report_timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_file_sink_missing_stage_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileOutputSink::new(dir.path().join("results"));
        assert!(sink.read(StageKind::Critique).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_sink_raw_events_and_usage() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileOutputSink::new(dir.path());
        let entry = RawLogEntry {
            operation: OperationTag::CritiqueOnly,
            received_at: Utc::now(),
            kind: "ping".into(),
            payload: json!({"type": "ping"}),
        };
        sink.persist_raw_events(OperationTag::CritiqueOnly, &[entry])
            .await
            .unwrap();
        assert!(dir.path().join("raw_events_critique.json").exists());

        sink.persist_usage_report(&UsageAggregator::default().usage_report())
            .await
            .unwrap();
        assert!(dir.path().join(TOKEN_USAGE_FILE).exists());
    }

    #[test]
    fn test_memory_sink_prefers_persisted_over_seeded() {
        tokio_test::block_on(async {
            let sink = MemoryOutputSink::new().with_existing(StageKind::Research, "old findings");
            assert_eq!(
                sink.read(StageKind::Research).await.unwrap().as_deref(),
                Some("old findings")
            );
            sink.persist(&artifact(StageKind::Research, "new findings"))
                .await
                .unwrap();
            let read = sink.read(StageKind::Research).await.unwrap().unwrap();
            assert!(read.starts_with("new findings"));
            assert_eq!(sink.persisted_stages(), vec![StageKind::Research]);
        });
    }
}

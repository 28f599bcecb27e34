//! # IO Utilities
//!
//! File system helpers for the results directory.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const RESEARCH_TEXT_FILE: &str = "research_results.txt";
pub const RESEARCH_JSON_FILE: &str = "research_results.json";
pub const CRITIQUE_FILE: &str = "critique_results.txt";
pub const FINAL_REPORT_FILE: &str = "final_report.md";
pub const TOKEN_USAGE_FILE: &str = "token_usage.json";

/// Get the results directory path
///
/// `VERITAS_RESULTS_DIR` overrides the default `results` directory under the
/// current working directory.
pub fn get_results_path() -> PathBuf {
    if let Ok(path) = std::env::var("VERITAS_RESULTS_DIR") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("results")
}

/// Ensure a directory exists
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .with_context(|| format!("Failed to create directory: {:?}", path))
}

/// Write a file, creating its parent directory
pub async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write file: {:?}", path))
}

/// Read a file, or `None` if it does not exist
pub async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read file: {:?}", path)),
    }
}

/// Load research input supplied by the user.
///
/// JSON files contribute their `content` field when they have one.
pub async fn load_input_file(path: &Path) -> Result<Option<String>> {
    let Some(raw) = read_optional(path).await? else {
        return Ok(None);
    };

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
            if let Some(content) = value.get("content").and_then(|c| c.as_str()) {
                return Ok(Some(content.to_string()));
            }
        }
    }

    Ok(Some(raw))
}

/// Header written at the top of text artifacts
pub fn file_header(title: &str, query: &str, generated: DateTime<Local>) -> String {
    format!(
        "{}: {}\nGenerated: {}\n{}\n\n",
        title,
        query,
        generated.format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(50)
    )
}

/// Header of the markdown final report
pub fn report_header(query: &str, generated: DateTime<Local>) -> String {
    format!(
        "# Final Research Report\n\n**Original Query:** {}\n\n**Generated:** {}\n\n---\n\n",
        query,
        generated.format("%Y-%m-%d %H:%M:%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_header_layout() {
        let at = Local.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let header = file_header("Research Query", "Is it SOC2?", at);
        assert_eq!(
            header,
            format!(
                "Research Query: Is it SOC2?\nGenerated: 2025-03-01 09:30:00\n{}\n\n",
                "=".repeat(50)
            )
        );
        let header = report_header("q", at);
        assert!(header.starts_with("# Final Research Report\n\n**Original Query:** q"));
    }

    #[tokio::test]
    async fn test_file_operations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.txt");

        assert!(read_optional(&path).await.unwrap().is_none());
        write_file(&path, "Hello, Veritas!").await.unwrap();
        assert_eq!(
            read_optional(&path).await.unwrap().as_deref(),
            Some("Hello, Veritas!")
        );
    }

    #[tokio::test]
    async fn test_load_input_file_extracts_json_content() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("research.json");
        write_file(&json_path, r#"{"query": "q", "content": "the findings"}"#)
            .await
            .unwrap();
        assert_eq!(
            load_input_file(&json_path).await.unwrap().as_deref(),
            Some("the findings")
        );

        let text_path = dir.path().join("research.txt");
        write_file(&text_path, "plain findings").await.unwrap();
        assert_eq!(
            load_input_file(&text_path).await.unwrap().as_deref(),
            Some("plain findings")
        );

        let missing = dir.path().join("missing.txt");
        assert!(load_input_file(&missing).await.unwrap().is_none());
    }
}

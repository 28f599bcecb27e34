//! # Configuration
//!
//! Persisted settings in `.veritas/config.json`. Every field is optional in
//! the file; anything absent takes its built-in default. Command-line flags
//! are layered on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::knowledge::KnowledgeConfig;
use crate::models::StageModels;
use crate::usage::PricingTable;
use crate::workflow::coordinator::{CoordinatorConfig, DEFAULT_QUERY};
use crate::workflow::ToolCatalog;

pub const CONFIG_DIR: &str = ".veritas";
pub const CONFIG_FILE: &str = "config.json";

fn default_query() -> String {
    DEFAULT_QUERY.to_string()
}

fn default_knowledge() -> Option<KnowledgeConfig> {
    Some(KnowledgeConfig::default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VeritasConfig {
    /// Where artifacts are written; `VERITAS_RESULTS_DIR` or `./results` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_dir: Option<PathBuf>,
    #[serde(default = "default_query")]
    pub default_query: String,
    #[serde(default)]
    pub models: StageModels,
    /// Responses API base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Knowledge server for the critique stage; `null` disables it
    #[serde(default = "default_knowledge")]
    pub knowledge: Option<KnowledgeConfig>,
    #[serde(default)]
    pub tools: ToolCatalog,
    #[serde(default)]
    pub pricing: PricingTable,
}

impl Default for VeritasConfig {
    fn default() -> Self {
        Self {
            results_dir: None,
            default_query: default_query(),
            models: StageModels::default(),
            base_url: None,
            knowledge: default_knowledge(),
            tools: ToolCatalog::default(),
            pricing: PricingTable::default(),
        }
    }
}

impl VeritasConfig {
    pub fn default_path() -> PathBuf {
        PathBuf::from(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    ///
    /// A file that exists but does not parse is an error rather than a
    /// silent reset.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config {}", path.display()))
    }

    /// Settings the coordinator needs
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            default_query: self.default_query.clone(),
            models: self.models.clone(),
            catalog: self.tools.clone(),
            pricing: self.pricing.clone(),
        }
    }
}

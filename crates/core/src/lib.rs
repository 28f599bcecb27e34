//! # Veritas Core
//!
//! Orchestration core of the Veritas research pipeline: a research agent
//! answers a query, a critique agent audits the answer, and a final report
//! agent merges both. Contains the agent runtime, usage accounting, and
//! artifact persistence.
//!
//! ## Architecture
//!
//! - `workflow/` - Run planning, the stage coordinator, agent invocation, event normalization
//! - `agents/` - Agent capability seam and the Responses API implementation
//! - `usage/` - Token accounting and cost estimates
//! - `state/` - Output sinks and results-directory I/O
//! - `knowledge/` - MCP knowledge service used during critique
//! - `models` - Per-stage model configuration
//! - `config` - Persisted settings
//!
//! ## Usage
//!
//! ```rust,ignore
//! use veritas_core::workflow::{Coordinator, CoordinatorConfig, RunOptions};
//!
//! let mut coordinator = Coordinator::new(CoordinatorConfig::default(), factory, sink);
//! let outcome = coordinator.run(&RunOptions::default()).await;
//! std::process::exit(outcome.status.code());
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod models;
pub mod sse;
pub mod state;
pub mod usage;
pub mod workflow;

pub use error::{ExitStatus, PipelineError};

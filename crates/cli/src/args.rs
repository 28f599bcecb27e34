//! Command-line arguments.

use clap::Parser;
use std::path::PathBuf;
use veritas_core::config::VeritasConfig;
use veritas_core::usage::ReasoningRate;
use veritas_core::workflow::RunOptions;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Veritas - research, critique, and report with LLM agents"
)]
pub struct Args {
    /// Research query; a built-in compliance question is used when omitted
    #[arg(short, long)]
    pub query: Option<String>,

    /// Stream agent activity (reasoning, tool calls, searches)
    #[arg(short, long)]
    pub verbose: bool,

    /// Critique the research after it completes
    #[arg(short, long)]
    pub critique: bool,

    /// Critique existing research without running the research stage
    #[arg(long)]
    pub critique_only: bool,

    /// Synthesize a final report after the other stages
    #[arg(short = 'r', long)]
    pub final_report: bool,

    /// Build a final report from saved research and critique
    #[arg(long)]
    pub final_report_only: bool,

    /// Research to critique in --critique-only mode (text or JSON with a "content" field)
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Let the critique agent hand control back to the research agent
    #[arg(short, long)]
    pub iterative: bool,

    #[arg(long)]
    pub research_model: Option<String>,

    #[arg(long)]
    pub critique_model: Option<String>,

    #[arg(long)]
    pub final_report_model: Option<String>,

    /// Directory for result artifacts
    #[arg(long, env = "VERITAS_RESULTS_DIR")]
    pub results_dir: Option<PathBuf>,

    /// Config file
    #[arg(long, default_value = ".veritas/config.json")]
    pub config: PathBuf,

    /// Bill reasoning tokens at the input or output rate in cost estimates
    #[arg(long)]
    pub reasoning_rate: Option<ReasoningRate>,

    /// Disable the knowledge server during critique
    #[arg(long)]
    pub no_knowledge: bool,
}

impl Args {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            query: self.query.clone(),
            verbose: self.verbose,
            critique: self.critique,
            critique_only: self.critique_only,
            final_report: self.final_report,
            final_report_only: self.final_report_only,
            iterative: self.iterative,
            input_file: self.input_file.clone(),
        }
    }

    /// Layer flags over the persisted settings
    pub fn apply(&self, config: &mut VeritasConfig) {
        if let Some(model) = &self.research_model {
            config.models.research.model = model.clone();
        }
        if let Some(model) = &self.critique_model {
            config.models.critique.model = model.clone();
        }
        if let Some(model) = &self.final_report_model {
            config.models.final_report.model = model.clone();
        }
        if self.results_dir.is_some() {
            config.results_dir = self.results_dir.clone();
        }
        if let Some(rate) = self.reasoning_rate {
            config.pricing.reasoning_rate = rate;
        }
        if self.no_knowledge {
            config.knowledge = None;
        }
    }
}

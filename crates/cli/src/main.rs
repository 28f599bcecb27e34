//! Veritas CLI
//!
//! Runs the research pipeline once and exits with its status code.

mod args;
mod display;

use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use veritas_core::agents::{OpenAiAgentFactory, OpenAiClient};
use veritas_core::config::VeritasConfig;
use veritas_core::knowledge::{KnowledgeService, McpHttpClient};
use veritas_core::state::FileOutputSink;
use veritas_core::workflow::{Coordinator, RunOutcome, StageKind};
use veritas_core::ExitStatus;

use args::Args;

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,veritas_core=info,veritas_cli=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_header() {
    println!("🔍 Veritas Research");
    println!("{}", "=".repeat(40));
}

fn print_outcome(outcome: &RunOutcome, sink: &FileOutputSink) {
    let last = [StageKind::FinalReport, StageKind::Critique, StageKind::Research]
        .into_iter()
        .find(|stage| outcome.completed.contains(stage));

    if let Some(stage) = last {
        if let Some(output) = outcome.output(stage) {
            println!("\n{}", "=".repeat(60));
            println!("FINAL OUTPUT ({}):", stage);
            println!("{}", "=".repeat(60));
            println!("{}", output);
            println!("{}\n", "=".repeat(60));
        }
    }

    let total = &outcome.usage.total_usage;
    if total.requests > 0 {
        println!(
            "🎯 Total tokens: {} ({} input, {} output)",
            veritas_core::usage::with_commas(total.total_tokens),
            veritas_core::usage::with_commas(total.input_tokens),
            veritas_core::usage::with_commas(total.output_tokens)
        );
    }

    match &outcome.failure {
        None => println!("✅ Results saved to {}", sink.dir().display()),
        Some(failure) => eprintln!("❌ Error: {}", failure.error),
    }
}

async fn run(args: Args) -> anyhow::Result<ExitStatus> {
    let mut config = match VeritasConfig::load(&args.config).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return Ok(ExitStatus::ValidationFailure);
        }
    };
    args.apply(&mut config);

    let client = match OpenAiClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return Ok(ExitStatus::ValidationFailure);
        }
    };
    let client = match &config.base_url {
        Some(url) => client.with_base_url(url.clone()),
        None => client,
    };

    let mut factory = OpenAiAgentFactory::new(client, config.models.clone());
    let knowledge = match config.knowledge.clone().map(McpHttpClient::new).transpose() {
        Ok(knowledge) => knowledge.map(Arc::new),
        Err(e) => {
            tracing::warn!("Knowledge server disabled: {}", e);
            None
        }
    };
    if let Some(service) = &knowledge {
        factory = factory.with_knowledge(service.clone());
    }

    let sink = Arc::new(match &config.results_dir {
        Some(dir) => FileOutputSink::new(dir.clone()),
        None => FileOutputSink::from_env(),
    });

    let (event_tx, event_rx) = mpsc::channel(256);
    let printer = tokio::spawn(display::print_events(event_rx, args.verbose));

    let mut coordinator =
        Coordinator::new(config.coordinator_config(), Arc::new(factory), sink.clone())
            .with_event_channel(event_tx);

    let options = args.run_options();
    if options.query.is_none() {
        println!("Using default query: {}", config.default_query);
    }

    let outcome = tokio::select! {
        outcome = coordinator.run(&options) => Some(outcome),
        _ = tokio::signal::ctrl_c() => None,
    };
    drop(coordinator);
    let _ = printer.await;

    match outcome {
        Some(outcome) => {
            print_outcome(&outcome, &sink);
            Ok(outcome.status)
        }
        None => {
            eprintln!("\n⚠️  Interrupted");
            if let Some(service) = knowledge {
                if let Err(e) = service.disconnect().await {
                    tracing::warn!("Failed to close knowledge session: {}", e);
                }
            }
            Ok(ExitStatus::Unclassified)
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);
    print_header();

    let status = match run(args).await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            ExitStatus::Unclassified
        }
    };
    std::process::exit(status.code());
}

//! # OSB Aggregator - Main Entry Point
//!
//! Runs one aggregation level per invocation:
//!
//! 1. **Initialize logging**: colorized console output, optional log file
//! 2. **Parse arguments**: subcommand plus metrics store options
//! 3. **Aggregate**: node, round or cross-pattern reduction
//! 4. **Report**: print per-node and aggregate tables
//! 5. **Persist**: write the result file, only when aggregation succeeded
//!
//! ## Error Handling
//!
//! Every aggregation error is fatal. The cause is logged with the offending
//! identifier or file, no output file is written, and the process exits
//! with status 1.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use osb_aggregator::{
    aggregate::{aggregate_folder, aggregate_nodes_from_store, aggregate_rounds_from_store},
    cli::{Args, Command, StoreArgs},
    logging,
    model::MetricKind,
    report,
    results::{aggregate_output_path, node_output_path, AggregateResult},
    store::{IdFilter, OpenSearchStore, StoreConfig},
    VERSION,
};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let guard = logging::init(args.verbose, args.log_file.as_deref())?;

    info!("Starting OSB Aggregator v{}", VERSION);
    info!("{}", args.command);

    let outcome = run(&args).await;
    if let Err(e) = &outcome {
        error!("{:#}", e);
    }

    // Flush the log file before exiting
    drop(guard);
    if outcome.is_err() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: &Args) -> Result<()> {
    match &args.command {
        Command::Nodes { id, output_name } => run_nodes(&args.store, id, output_name).await,
        Command::Rounds {
            test_id_pattern,
            test_ids,
            output_name,
            latency,
        } => {
            let filters = IdFilter::for_rounds(test_id_pattern.as_deref(), test_ids.as_deref())?;
            let (store, config) = connect(&args.store)?;
            let result = aggregate_rounds_from_store(&store, &filters, &config.query_options())
                .await
                .context("Round-level aggregation failed")?;
            finish(&result, &aggregate_output_path(output_name), *latency)
        }
        Command::CrossPattern {
            folder,
            output_name,
            latency,
        } => {
            let result = aggregate_folder(folder).with_context(|| {
                format!("Cross-pattern aggregation of {} failed", folder.display())
            })?;
            finish(&result, &aggregate_output_path(output_name), *latency)
        }
    }
}

fn connect(store_args: &StoreArgs) -> Result<(OpenSearchStore, StoreConfig)> {
    let config = StoreConfig::try_from(store_args)?;
    info!("Metrics store: {}", config.base_url());
    let store = OpenSearchStore::new(&config).context("Failed to create metrics store client")?;
    Ok((store, config))
}

async fn run_nodes(store_args: &StoreArgs, id: &str, output_name: &str) -> Result<()> {
    let (store, config) = connect(store_args)?;
    let aggregation = aggregate_nodes_from_store(&store, id, &config.query_options())
        .await
        .with_context(|| format!("Node-level aggregation of '{}' failed", id))?;

    for kind in MetricKind::ALL {
        if let Some(table) = report::node_table(&aggregation, kind) {
            println!("{} per node:\n{}", kind, table);
        }
    }
    finish(&aggregation.averaged, &node_output_path(output_name), true)
}

fn finish(result: &AggregateResult, output: &Path, include_latency: bool) -> Result<()> {
    println!("{}", report::aggregate_table(result, include_latency));
    result
        .write_to(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Outputted to file called {}", output.display());
    Ok(())
}

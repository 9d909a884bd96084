//! # embed-dispatch CLI Application
//!
//! This module implements the command-line interface for the embedding client.
//! It reads JSON records, embeds the configured text columns through the
//! remote embeddings API and writes the records back out with vectors in place.
//!
//! ## Key Components
//!
//! - CLI argument parsing with clap
//! - `embed`: JSONL in, JSONL out, one vector per configured column
//!
//! ## Features
//!
//! - Input from a file or stdin, output to a file or stdout
//! - Config file with command-line overrides
//! - Parallel workers over contiguous shards, reassembled in input order
//! - Progress tracking on stderr
//! - Ctrl-C cancels pending throttle and backoff sleeps
//! - Optional OpenTelemetry export of traces and counters

mod telemetry;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use embed_dispatch::metrics::{FanoutMetrics, InMemoryMetrics, MetricsSink, TracingMetrics};
use embed_dispatch::records::embed_columns_with_progress;
use embed_dispatch::{EmbeddingClient, EmbeddingConfig};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use telemetry::OtelGuard;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

#[derive(Parser)]
#[command(author, version, about = "Batched, throttled text embeddings for JSONL records", long_about = None)]
struct Cli {
    /// Export traces and counters over OTLP
    #[arg(long, global = true)]
    otel: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed text columns of JSONL records
    Embed(EmbedArgs),
}

#[derive(Args, Debug)]
struct EmbedArgs {
    /// Input JSONL file (default: stdin)
    input: Option<PathBuf>,

    /// Output JSONL file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Column to embed; repeat for several columns
    #[arg(short, long = "column")]
    columns: Vec<String>,

    /// Embedding model
    #[arg(short, long)]
    model: Option<String>,

    /// Output dimensionality
    #[arg(short, long)]
    dimensions: Option<u32>,

    /// Number of texts per request
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long, default_value = "1")]
    workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _otel: Option<OtelGuard> = if cli.otel {
        Some(telemetry::init_tracing_subscriber()?)
    } else {
        telemetry::init_console_subscriber();
        None
    };

    match cli.command {
        Some(Commands::Embed(args)) => {
            embed_command(args, cli.otel).await?;
        }
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

fn load_config(args: &EmbedArgs) -> anyhow::Result<EmbeddingConfig> {
    let mut config = match &args.config {
        Some(path) => EmbeddingConfig::from_file(path)?,
        None => EmbeddingConfig::default(),
    };

    if !args.columns.is_empty() {
        config.columns = args.columns.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(dimensions) = args.dimensions {
        config.dimensions = Some(dimensions);
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }

    config.validate()?;
    if config.columns.is_empty() {
        bail!("At least one --column is required");
    }
    Ok(config)
}

fn read_records(input: Option<&Path>) -> anyhow::Result<Vec<Value>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let mut records = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", number + 1))?;
        records.push(record);
    }
    Ok(records)
}

fn write_records(output: Option<&Path>, records: &[Value]) -> anyhow::Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Split `records` into at most `workers` contiguous shards of near-equal size
fn shard(mut records: Vec<Value>, workers: usize) -> Vec<Vec<Value>> {
    let shard_size = records.len().div_ceil(workers.max(1)).max(1);
    let mut shards = Vec::new();
    while !records.is_empty() {
        let rest = records.split_off(shard_size.min(records.len()));
        shards.push(records);
        records = rest;
    }
    shards
}

#[instrument(skip_all, fields(workers = args.workers))]
async fn embed_command(args: EmbedArgs, otel: bool) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let records = read_records(args.input.as_deref())?;
    let total_texts = records.len() * config.columns.len();

    info!(
        records = records.len(),
        columns = ?config.columns,
        model = %config.model,
        "Embedding records"
    );

    let totals = Arc::new(InMemoryMetrics::new());
    let metrics: Arc<dyn MetricsSink> = if otel {
        Arc::new(FanoutMetrics::new(vec![
            totals.clone() as Arc<dyn MetricsSink>,
            Arc::new(TracingMetrics),
        ]))
    } else {
        totals.clone()
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling pending requests");
                cancel.cancel();
            }
        }
    });

    let client = EmbeddingClient::new(config, metrics).with_cancellation(cancel);
    let connection = client.load_connection()?;

    let progress_bar = ProgressBar::new(total_texts as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")?
            .progress_chars("##-"),
    );
    progress_bar.set_message("Embedding...");

    let start_time = std::time::Instant::now();

    let handles: Vec<_> = shard(records, args.workers)
        .into_iter()
        .map(|records| {
            let mut worker = client.worker();
            let connection = connection.clone();
            let progress_bar = progress_bar.clone();
            tokio::spawn(async move {
                embed_columns_with_progress(&mut worker, records, &connection, |n| {
                    progress_bar.inc(n as u64)
                })
                .await
            })
        })
        .collect();

    let mut embedded = Vec::new();
    for result in futures::future::try_join_all(handles).await? {
        embedded.extend(result?);
    }
    progress_bar.finish_with_message("Embedding completed");

    write_records(args.output.as_deref(), &embedded)?;

    info!(
        records = embedded.len(),
        elapsed = ?start_time.elapsed(),
        "Embedding completed successfully"
    );
    for (counter, value) in totals.snapshot() {
        info!(counter = %counter, value, "Metrics summary");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_shards_are_contiguous_and_complete() {
        let records: Vec<Value> = (0..10).map(|i| json!({ "i": i })).collect();

        let shards = shard(records.clone(), 3);

        assert_eq!(
            shards.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_eq!(shards.concat(), records);
    }

    #[test]
    fn test_more_workers_than_records() {
        let records: Vec<Value> = (0..2).map(|i| json!({ "i": i })).collect();

        assert_eq!(shard(records, 8).len(), 2);
        assert!(shard(Vec::new(), 4).is_empty());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "embed-dispatch",
            "embed",
            "--column",
            "title",
            "-c",
            "body",
            "--batch-size",
            "5",
            "--model",
            "text-embedding-3-small",
        ]);
        let Some(Commands::Embed(args)) = cli.command else {
            panic!("expected embed command");
        };

        let config = load_config(&args).unwrap();

        assert_eq!(config.columns, vec!["title", "body"]);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.model, "text-embedding-3-small");
    }

    #[test]
    fn test_missing_columns_rejected() {
        let cli = Cli::parse_from(["embed-dispatch", "embed"]);
        let Some(Commands::Embed(args)) = cli.command else {
            panic!("expected embed command");
        };

        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_jsonl_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.jsonl");
        std::fs::write(&input, "{\"text\":\"a\"}\n\n{\"text\":\"b\"}\n").unwrap();

        let records = read_records(Some(&input)).unwrap();
        assert_eq!(records, vec![json!({"text": "a"}), json!({"text": "b"})]);

        let output = dir.path().join("out.jsonl");
        write_records(Some(&output), &records).unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "{\"text\":\"a\"}\n{\"text\":\"b\"}\n"
        );
    }
}

//! reach-cli: REACH API 的命令行工具
//!
//! Usage:
//!   reach-cli append <data_tool> <rows.jsonl> [--output <type>]... [--verbose]
//!   reach-cli listgen <data_tool> [--input key=value]... [--output <type>]... [--verbose]
//!   reach-cli version
//!   reach-cli help

use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use reach_client::{ClientConfig, InputRow, ListgenBody, ListgenInputs, ReachClient};
use serde_json::Value;
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "append" => cmd_append(&args[2..]).await,
        "listgen" => cmd_listgen(&args[2..]).await,
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"reach-cli: REACH API 命令行工具

USAGE:
    reach-cli <COMMAND> [OPTIONS]

COMMANDS:
    append <data_tool> <rows.jsonl>   Enrich one JSON object per line; prints one outcome per line
    listgen <data_tool>               Run a list-generation query; prints one record per line
    version                           Show version information
    help                              Show this help message

OPTIONS:
    --output <type>                   Output type to request (repeatable)
    --input <key=value>               listgen input (repeatable; repeated keys send several values)
    --verbose                         Debug logging with request/response detail

ENVIRONMENT:
    REACH_API_KEY                     API key (required)
    REACH_*                           Client configuration overrides
    RUST_LOG                          Log filter (default: info)"#
    );
}

fn version_line() -> String {
    format!("reach-cli {}", env!("CARGO_PKG_VERSION"))
}

fn cmd_version() {
    println!("{}", version_line());
}

/// Flags shared by both commands, plus the positional arguments left over.
#[derive(Debug, Default)]
struct CommonArgs {
    positional: Vec<String>,
    outputs: Vec<String>,
    inputs: Vec<(String, String)>,
    verbose: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<CommonArgs> {
    let mut parsed = CommonArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--output" => {
                let value = iter.next().ok_or_else(|| anyhow!("--output needs a value"))?;
                parsed.outputs.push(value.clone());
            }
            "--input" => {
                let value = iter.next().ok_or_else(|| anyhow!("--input needs key=value"))?;
                let (k, v) = value
                    .split_once('=')
                    .ok_or_else(|| anyhow!("--input expects key=value, got {value}"))?;
                parsed.inputs.push((k.to_string(), v.to_string()));
            }
            "--verbose" | "-v" => parsed.verbose = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => parsed.positional.push(arg.clone()),
        }
    }
    Ok(parsed)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn build_client(verbose: bool) -> anyhow::Result<ReachClient> {
    let api_key = std::env::var("REACH_API_KEY").context("REACH_API_KEY is not set")?;
    let mut config = ClientConfig::from_env();
    if verbose {
        config = config.with_verbose(true);
    }
    Ok(ReachClient::builder(api_key).config(config).build()?)
}

/// One row per non-blank line; non-string JSON values are sent in their JSON form.
fn read_rows(path: &str) -> anyhow::Result<Vec<InputRow>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let mut rows = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value =
            serde_json::from_str(line).with_context(|| format!("{path}:{}: invalid JSON", n + 1))?;
        let Value::Object(fields) = value else {
            bail!("{path}:{}: expected a JSON object", n + 1);
        };
        rows.push(
            fields
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
        );
    }
    Ok(rows)
}

async fn cmd_append(args: &[String]) -> anyhow::Result<()> {
    let parsed = parse_args(args)?;
    let [data_tool, rows_path] = parsed.positional.as_slice() else {
        bail!("usage: reach-cli append <data_tool> <rows.jsonl> [--output <type>]...");
    };
    init_logging(parsed.verbose);

    let client = build_client(parsed.verbose)?;
    let rows = read_rows(rows_path)?;
    let outputs: Vec<&str> = parsed.outputs.iter().map(String::as_str).collect();

    let mut batches = client.append(data_tool, rows, &outputs)?;
    let stdout = std::io::stdout();
    let (mut succeeded, mut failed) = (0usize, 0usize);
    while let Some(batch) = batches.next().await {
        succeeded += batch.success_count();
        failed += batch.failure_count();
        let mut out = stdout.lock();
        for outcome in batch.iter() {
            writeln!(out, "{}", serde_json::to_string(outcome)?)?;
        }
    }
    tracing::info!(succeeded, failed, "append finished");
    Ok(())
}

async fn cmd_listgen(args: &[String]) -> anyhow::Result<()> {
    let parsed = parse_args(args)?;
    let [data_tool] = parsed.positional.as_slice() else {
        bail!("usage: reach-cli listgen <data_tool> [--input key=value]... [--output <type>]...");
    };
    init_logging(parsed.verbose);

    let client = build_client(parsed.verbose)?;
    let outputs: Vec<&str> = parsed.outputs.iter().map(String::as_str).collect();

    let mut inputs: ListgenInputs = Vec::new();
    for (k, v) in parsed.inputs {
        match inputs.iter_mut().find(|(name, _)| *name == k) {
            Some((_, values)) => values.push(v),
            None => inputs.push((k, vec![v])),
        }
    }

    let response = client.listgen(data_tool, inputs, &outputs).await?;
    match response.body {
        ListgenBody::Records(mut records) => {
            let mut count = 0usize;
            while let Some(record) = records.next().await {
                println!("{}", serde_json::to_string(&record?)?);
                count += 1;
            }
            tracing::info!(records = count, "listgen finished");
            Ok(())
        }
        ListgenBody::Error { raw, .. } => {
            eprintln!("{}", String::from_utf8_lossy(&raw));
            bail!("listgen failed with HTTP {}", response.http_status)
        }
        ListgenBody::Empty => bail!(
            "listgen failed: {}",
            response.error_message.unwrap_or_else(|| "no response".to_string())
        ),
    }
}

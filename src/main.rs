//! kpi-report: build KPI reports from tabular query results.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use kpi_report::{
    config::EngineConfig,
    loader,
    output::{self, FlatTable},
    reports::{run_kind, ReportContext, ReportKind},
    store::{DatasetStore, JsonFileStore},
    types::DateRange,
    util,
};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kpi-report")]
#[command(version, about = "Nested KPI reports from flat query results", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a report from a CSV or JSON dataset
    Run(RunArgs),
    /// Print a stored dataset
    Show {
        /// Reference returned when the dataset was stored
        reference: String,

        /// Dataset store directory
        #[arg(long, env = "KPI_REPORT_STORE", default_value = "datasets")]
        store: PathBuf,

        /// Rows to print
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
    /// List the available reports and the fields they need
    Kinds,
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(value_enum)]
    kind: ReportKind,

    /// Dataset file (.csv, or .json with columns and rows)
    #[arg(short, long)]
    input: PathBuf,

    /// First day of the requested range (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last day of the requested range; defaults to today
    #[arg(long, requires = "start")]
    end: Option<NaiveDate>,

    /// Override the current date
    #[arg(long)]
    today: Option<NaiveDate>,

    /// YAML engine configuration
    #[arg(short, long, env = "KPI_REPORT_CONFIG")]
    config: Option<PathBuf>,

    /// Dataset reference to echo as full_data_reference
    #[arg(long)]
    reference: Option<String>,

    /// Store the input here and reference the stored copy
    #[arg(long, env = "KPI_REPORT_STORE")]
    store: Option<PathBuf>,

    /// Write the report JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export every table of the report as CSV into this directory
    #[arg(long)]
    csv_dir: Option<PathBuf>,

    /// Print markdown previews of each table with this many rows
    #[arg(long)]
    preview: Option<usize>,
}

fn run(args: RunArgs) -> Result<()> {
    let today = args
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let config = match &args.config {
        Some(path) => EngineConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    let (raw, load_report) = loader::load_raw(&args.input)
        .with_context(|| format!("failed to load {}", args.input.display()))?;
    eprintln!(
        "Processing dataset... ({} rows loaded, {} skipped)",
        util::format_int(load_report.loaded_rows),
        util::format_int(load_report.skipped_rows)
    );

    let mut ctx = ReportContext::new(today).with_config(config);
    if let Some(start) = args.start {
        let range = DateRange::new(start, args.end.unwrap_or(today))?;
        ctx = ctx.with_range(range);
    }
    let reference = match (args.reference, &args.store) {
        (Some(reference), _) => Some(reference),
        (None, Some(root)) => Some(
            JsonFileStore::new(root)
                .save(&raw)
                .context("failed to store dataset")?,
        ),
        (None, None) => None,
    };
    if let Some(reference) = reference {
        ctx = ctx.with_reference(reference);
    }

    let doc = run_kind(args.kind, &raw, &ctx)
        .with_context(|| format!("failed to build the {:?} report", args.kind))?;

    match &args.output {
        Some(path) => {
            output::write_json(path, &doc)?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&doc)?),
    }

    if let Some(dir) = &args.csv_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let tables = output::flat_tables(&doc);
        for table in &tables {
            let file = dir.join(format!("{}.csv", csv_name(&table.name)));
            output::write_csv(&file, table)?;
        }
        eprintln!(
            "{} tables exported to {}",
            util::format_int(tables.len()),
            dir.display()
        );
    }

    if let Some(rows) = args.preview {
        output::preview_tables(&doc, rows);
    }
    Ok(())
}

fn csv_name(table: &str) -> String {
    table
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn show(reference: &str, store: PathBuf, rows: usize) -> Result<()> {
    let raw = JsonFileStore::new(store)
        .load(reference)
        .with_context(|| format!("failed to load dataset {reference}"))?;
    println!("{}", raw.description);
    println!(
        "{} columns, {} rows\n",
        util::format_int(raw.columns.len()),
        util::format_int(raw.rows.len())
    );
    let table = FlatTable {
        name: reference.to_string(),
        headers: raw.columns,
        rows: raw.rows,
    };
    println!("{}", output::render_markdown(&table, rows));
    Ok(())
}

fn kinds() {
    for kind in ReportKind::ALL {
        let name = serde_json::to_value(kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        println!("{name:<16} {}", kind.description());
        let fields: Vec<String> = kind
            .schema()
            .fields
            .iter()
            .map(|f| {
                if f.required {
                    f.name.to_string()
                } else {
                    format!("[{}]", f.name)
                }
            })
            .collect();
        println!("{:<16} {}\n", "", fields.join(", "));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Show {
            reference,
            store,
            rows,
        } => show(&reference, store, rows),
        Commands::Kinds => {
            kinds();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn end_requires_start() {
        let parsed = Cli::try_parse_from(["kpi-report", "run", "quotes", "-i", "q.csv", "--end", "2025-11-30"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn nested_table_names_become_file_names() {
        assert_eq!(csv_name("by_rep[0].rows"), "by_rep_0__rows");
    }
}

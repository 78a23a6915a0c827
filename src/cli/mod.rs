//! Command-line interface for the curator.
//!
//! Provides commands for curating single texts and batches, and for
//! searching, exporting and summarising the stored records.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::config;
use crate::core::{AutoApprove, CurateOutcome, Curator, ReviewOutcome, Reviewer};
use crate::domain::{CategoryId, RawInput, SourceMetadata};
use crate::store::{ExportFilter, ExportFormat, JsonlRecordStore, RecordStore, SearchQuery};

pub mod review;

use review::{render_candidate, ConsoleReviewer};

/// curator - Normalize, de-duplicate and categorize advice texts
#[derive(Parser, Debug)]
#[command(name = "curator")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Curate a single text
    Process {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Accept the fused result without prompting
        #[arg(short, long)]
        yes: bool,

        /// Classify and show the result without storing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Curate a JSON-lines file of {"text": ..., "source": {...}} entries
    Batch {
        /// JSON-lines input file
        file: PathBuf,

        /// Inputs processed concurrently (forced to 1 when prompting)
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Accept every fused result without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Search stored records
    Search {
        /// Case-insensitive substring
        query: String,

        /// Restrict to one category
        #[arg(short, long)]
        category: Option<String>,

        /// Maximum number of records to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export stored records
    Export {
        #[arg(short, long)]
        category: Option<String>,

        #[arg(long)]
        min_confidence: Option<f64>,

        #[arg(short, long, value_enum, default_value = "json")]
        format: ExportFormat,

        /// Output file (writes to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show record counts per category
    Stats,

    /// List categories and subcategories
    Taxonomy,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Process {
                input,
                yes,
                dry_run,
            } => process_input(input, yes, dry_run).await,
            Commands::Batch { file, jobs, yes } => run_batch(&file, jobs, yes).await,
            Commands::Search {
                query,
                category,
                limit,
            } => search_records(&query, category, limit).await,
            Commands::Export {
                category,
                min_confidence,
                format,
                output,
            } => export_records(category, min_confidence, format, output).await,
            Commands::Stats => show_stats().await,
            Commands::Taxonomy => show_taxonomy(),
            Commands::Config => show_config(),
        }
    }
}

/// Build a curator from the resolved configuration
async fn build_curator(max_parallel: Option<usize>) -> Result<Curator> {
    let cfg = config::config()?;
    let settings = &cfg.settings;

    let store = Arc::new(JsonlRecordStore::open(cfg.records.clone()).await?);
    let taxonomy = Arc::new(cfg.taxonomy()?);

    let mut builder = Curator::builder(taxonomy, store, cfg.embedder())
        .with_normalizer(settings.normalizer.clone())
        .with_fusion(settings.fusion.clone())
        .with_dedup_threshold(settings.dedup.threshold)
        .with_timeouts(settings.timeouts.clone())
        .with_subcategory_prototypes(settings.taxonomy.subcategory_prototypes)
        .with_zero_shot_subcategories(settings.capabilities.zero_shot.subcategories)
        .with_max_parallel(max_parallel.unwrap_or(settings.batch.max_parallel));

    if let Some(scorer) = cfg.zero_shot() {
        builder = builder.with_zero_shot(scorer);
    }

    builder.build().await.context("Failed to initialise curator")
}

/// Read raw bytes from a file or piped stdin
fn read_input(input: Option<PathBuf>) -> Result<Vec<u8>> {
    if let Some(path) = input {
        return std::fs::read(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()));
    }

    if io::stdin().is_terminal() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read from stdin")?;
    Ok(buffer)
}

/// Interactive review answers come from stdin, so the text must not
fn ensure_review_input(input: Option<&Path>, yes: bool, dry_run: bool) -> Result<()> {
    if input.is_none() && !yes && !dry_run {
        anyhow::bail!(
            "Interactive review reads answers from stdin; pass the text with --input <file>, or use --yes"
        );
    }
    Ok(())
}

/// Curate a single text
async fn process_input(input: Option<PathBuf>, yes: bool, dry_run: bool) -> Result<()> {
    ensure_review_input(input.as_deref(), yes, dry_run)?;
    let bytes = read_input(input)?;
    let curator = build_curator(None).await?;
    let candidate = curator.process(RawInput::from_bytes(bytes)).await?;

    if dry_run {
        println!("{}", render_candidate(&candidate));
        eprintln!("[dry run: nothing stored]");
        return Ok(());
    }

    let reviewer: Box<dyn Reviewer> = if yes {
        eprintln!("{}", render_candidate(&candidate));
        Box::new(AutoApprove)
    } else {
        Box::new(ConsoleReviewer::stdin())
    };

    match curator.review(candidate, reviewer.as_ref()).await? {
        ReviewOutcome::Confirmed(record) => {
            let category = record.record().category.clone();
            let receipt = curator.commit(record).await?;
            println!("{}", receipt.record_id);
            eprintln!("[stored as {}]", category);
        }
        ReviewOutcome::Rejected { reason, .. } => {
            eprintln!(
                "[rejected{}]",
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            );
        }
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct BatchLine {
    text: String,
    #[serde(default)]
    source: Option<SourceMetadata>,
}

/// Parse a JSON-lines batch file; malformed lines are reported with
/// their line number and skipped.
fn parse_batch(content: &str) -> (Vec<RawInput>, Vec<String>) {
    let mut inputs = Vec::new();
    let mut errors = Vec::new();

    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<BatchLine>(line) {
            Ok(entry) => {
                let mut raw = RawInput::from_text(entry.text);
                if let Some(source) = entry.source {
                    raw = raw.with_source(source);
                }
                inputs.push(raw);
            }
            Err(e) => errors.push(format!("line {}: {}", i + 1, e)),
        }
    }

    (inputs, errors)
}

async fn run_batch(file: &Path, jobs: Option<usize>, yes: bool) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read batch file: {}", file.display()))?;

    let (inputs, errors) = parse_batch(&content);
    for error in &errors {
        eprintln!("Skipping malformed entry ({})", error);
    }
    if inputs.is_empty() {
        anyhow::bail!("No valid entries in {}", file.display());
    }

    // Prompts cannot interleave
    let jobs = if yes { jobs } else { Some(1) };
    let curator = build_curator(jobs).await?;

    let reviewer: Box<dyn Reviewer> = if yes {
        Box::new(AutoApprove)
    } else {
        Box::new(ConsoleReviewer::stdin())
    };

    let items = curator.batch(inputs, reviewer.as_ref()).await;

    let (mut stored, mut rejected, mut failed) = (0, 0, 0);
    for item in &items {
        match &item.outcome {
            Ok(CurateOutcome::Stored(receipt)) => {
                stored += 1;
                println!("{}\tstored\t{}", item.position + 1, receipt.record_id);
            }
            Ok(CurateOutcome::Rejected { reason, .. }) => {
                rejected += 1;
                println!(
                    "{}\trejected\t{}",
                    item.position + 1,
                    reason.as_deref().unwrap_or("")
                );
            }
            Err(e) => {
                failed += 1;
                println!("{}\tfailed\t{}", item.position + 1, e);
            }
        }
    }

    eprintln!(
        "\n[{} stored, {} rejected, {} failed, {} malformed]",
        stored,
        rejected,
        failed,
        errors.len()
    );
    Ok(())
}

async fn open_store() -> Result<JsonlRecordStore> {
    JsonlRecordStore::open(config::records_path()?).await
}

fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

async fn search_records(query: &str, category: Option<String>, limit: usize) -> Result<()> {
    let store = open_store().await?;

    let mut search = SearchQuery::new(query).with_limit(limit);
    if let Some(category) = category {
        search = search.with_category(CategoryId::new(category));
    }
    let records = store.search(&search).await?;

    if records.is_empty() {
        println!("No records found");
        return Ok(());
    }

    println!("{:<38} {:<24} {:>6}  {}", "ID", "CATEGORY", "CONF", "TEXT");
    println!("{}", "-".repeat(110));
    for record in records {
        println!(
            "{:<38} {:<24} {:>6.3}  {}",
            record.id,
            record.category,
            record.confidence,
            preview(&record.text, 40)
        );
    }

    Ok(())
}

async fn export_records(
    category: Option<String>,
    min_confidence: Option<f64>,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let store = open_store().await?;
    let filter = ExportFilter {
        category: category.map(CategoryId::new),
        min_confidence,
        format,
    };
    let bytes = store.export(&filter).await?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, &bytes)
                .await
                .with_context(|| format!("Failed to write export: {}", path.display()))?;
            eprintln!("[exported to {}]", path.display());
        }
        None => {
            use std::io::Write;
            io::stdout()
                .write_all(&bytes)
                .context("Failed to write export to stdout")?;
        }
    }

    Ok(())
}

async fn show_stats() -> Result<()> {
    let store = open_store().await?;
    let stats = store.stats().await?;

    println!("Records:          {}", stats.total);
    println!("Mean confidence:  {:.3}", stats.mean_confidence);
    println!("Operator-edited:  {}", stats.edited);
    println!("Explicit reviews: {}", stats.explicit);
    println!("Auto-approved:    {}", stats.implicit);
    println!("Near-duplicates:  {}", stats.with_duplicate_warning);

    if !stats.by_category.is_empty() {
        println!();
        println!("{:<28} {:>6}", "CATEGORY", "COUNT");
        println!("{}", "-".repeat(35));
        for (category, count) in &stats.by_category {
            println!("{:<28} {:>6}", category, count);
        }
    }

    Ok(())
}

fn show_taxonomy() -> Result<()> {
    let taxonomy = config::config()?.taxonomy()?;

    for category in taxonomy.categories() {
        println!(
            "{} - {} ({} keywords)",
            category.id,
            category.name,
            category.keywords.len()
        );
        for sub in &category.subcategories {
            println!("    {} - {}", sub.id, sub.name);
        }
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!("Home:        {}", cfg.home.display());
    println!("Records:     {}", cfg.records.display());
    println!(
        "Taxonomy:    {}",
        cfg.taxonomy_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string())
    );
    println!();
    print!(
        "{}",
        serde_yaml::to_string(&cfg.settings).context("Failed to render settings")?
    );

    Ok(())
}

//! CLI implementation for fuzzydup

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::ProgressBar;

use fuzzydup::engine::{OutputBundle, RunStats, SOURCE_SYSTEM_COLUMN};
use fuzzydup::io;
use fuzzydup::{
    deduplicate, deduplicate_cross, EngineError, MatchConfig, OutputRegistry, PrecedenceMap,
    Rulebook, Table, Value,
};

#[derive(Parser)]
#[command(name = "fuzzydup")]
#[command(about = "Fuzzy deduplication and survivorship for tabular customer data")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Suppress progress output and warnings (errors still print)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Show debug info
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Deduplicate one or more source files independently
    Single {
        /// Input tables (CSV or XLSX), one source system per file
        files: Vec<PathBuf>,

        #[command(flatten)]
        matching: MatchOptions,

        /// Rulebook table (source_system, winning_criteria)
        #[arg(long)]
        rulebook: Option<PathBuf>,

        /// Directory for output workbooks and the registry
        #[arg(short = 'o', long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Combine sources and elect cross-system winners by precedence
    Cross {
        /// Input tables or per-source output workbooks
        files: Vec<PathBuf>,

        #[command(flatten)]
        matching: MatchOptions,

        /// Precedence table (source_system, precedence; lower wins)
        #[arg(long)]
        precedence: PathBuf,

        /// Directory for output workbooks
        #[arg(short = 'o', long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Print run statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a deterministic synthetic customer dataset
    Synth {
        /// Number of rows
        #[arg(long, default_value = "1000")]
        rows: usize,

        /// Fraction of rows seeded as near-duplicates
        #[arg(long, default_value = "0.1")]
        dup_fraction: f64,

        /// RNG seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output CSV path
        #[arg(short = 'o', long, default_value = "sample_customers.csv")]
        output: PathBuf,
    },
    /// Inspect or clear the processed-outputs registry
    Outputs {
        #[command(subcommand)]
        action: OutputsAction,

        /// Output directory holding the registry
        #[arg(short = 'o', long, default_value = "outputs", global = true)]
        output_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum OutputsAction {
    /// List recorded outputs
    List,
    /// Delete recorded output files and empty the registry
    Clear,
}

/// Matching flags shared by `single` and `cross`. CLI values override the
/// config file; per-column thresholds live in the config file only.
#[derive(Args)]
struct MatchOptions {
    /// Match config TOML file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Fuzzy columns (comma separated; overrides config file)
    #[arg(long, value_delimiter = ',')]
    fuzzy: Vec<String>,

    /// Exact columns (comma separated; overrides config file)
    #[arg(long, value_delimiter = ',')]
    exact: Vec<String>,

    /// Minimum average fuzzy score
    #[arg(long)]
    overall_threshold: Option<f64>,

    /// Split blocks larger than this many rows
    #[arg(long)]
    max_block_size: Option<usize>,

    /// Worker threads (default: cores - 1)
    #[arg(long)]
    parallelism: Option<usize>,

    /// Force single-threaded scoring
    #[arg(long)]
    sequential: bool,
}

impl MatchOptions {
    fn resolve(&self) -> Result<MatchConfig> {
        let mut config = match &self.config {
            Some(path) => MatchConfig::load(path)?,
            None => MatchConfig::default(),
        };
        if !self.fuzzy.is_empty() {
            config.fuzzy_columns = self.fuzzy.clone();
        }
        if !self.exact.is_empty() {
            config.exact_columns = self.exact.clone();
        }
        if let Some(threshold) = self.overall_threshold {
            config.overall_threshold = threshold;
        }
        if let Some(cap) = self.max_block_size {
            config.max_block_size = cap;
        }
        if self.sequential {
            config.parallelism = Some(1);
        } else if let Some(workers) = self.parallelism {
            config.parallelism = Some(workers);
        }
        if config.fuzzy_columns.is_empty() && config.exact_columns.is_empty() {
            bail!("no matching columns configured; pass --fuzzy/--exact or a config file");
        }
        Ok(config)
    }
}

pub fn run_with(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Single {
            ref files,
            ref matching,
            ref rulebook,
            ref output_dir,
            json,
        } => cmd_single(files, matching, rulebook.as_deref(), output_dir, json, cli.quiet),
        Commands::Cross {
            ref files,
            ref matching,
            ref precedence,
            ref output_dir,
            json,
        } => cmd_cross(files, matching, precedence, output_dir, json),
        Commands::Synth {
            rows,
            dup_fraction,
            seed,
            ref output,
        } => cmd_synth(rows, dup_fraction, seed, output),
        Commands::Outputs {
            ref action,
            ref output_dir,
        } => cmd_outputs(action, output_dir),
    }
}

// ============ single ============

fn cmd_single(
    files: &[PathBuf],
    matching: &MatchOptions,
    rulebook_path: Option<&Path>,
    output_dir: &Path,
    json: bool,
    quiet: bool,
) -> Result<()> {
    if files.is_empty() {
        bail!("no input files given");
    }
    let config = matching.resolve()?;
    let rulebook = match rulebook_path {
        Some(path) => Rulebook::load(path)?,
        None => {
            tracing::info!("no rulebook given; every source uses latest_transaction_date");
            Rulebook::default()
        }
    };
    let mut registry = OutputRegistry::load(output_dir)?;

    let progress = if quiet || files.len() < 2 {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(files.len() as u64)
    };

    for file in files {
        let table =
            io::read_table(file).with_context(|| format!("Failed to read {}", file.display()))?;
        let source_system = io::source_system_from_path(file);
        let rule_key = io::source_key(&source_system).to_string();

        let bundle = match deduplicate(&table, &config, &rulebook, &rule_key) {
            Ok(bundle) => bundle,
            Err(EngineError::NoMatchColumns) => {
                // The configured columns don't exist in this file. Pass the
                // rows through untouched rather than dropping the file.
                tracing::warn!(
                    file = %file.display(),
                    "no matching columns in table; writing all rows as unique"
                );
                passthrough_bundle(&table)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to process {}", file.display()))
            }
        };

        let output_path = write_single_output(output_dir, &source_system, &bundle)?;
        registry.record(fuzzydup::registry::entry_now(
            &source_system,
            file,
            &output_path,
            bundle.stats.input_records,
            bundle.stats.final_records,
        ));

        if json {
            println!("{}", serde_json::to_string_pretty(&bundle.stats)?);
        } else {
            print_summary(&source_system, &bundle.stats, &output_path);
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    registry.save(output_dir)?;
    Ok(())
}

/// All rows unique, no duplicates: the shape written when a file has none of
/// the configured matching columns.
fn passthrough_bundle(table: &Table) -> OutputBundle {
    let records = table.row_count();
    let empty = || Table::new(table.columns().iter().map(String::as_str));
    OutputBundle {
        final_rows: table.clone(),
        winner_rows: empty(),
        duplicate_rows: empty(),
        unique_rows: table.clone(),
        stats: RunStats {
            input_records: records,
            final_records: records,
            cluster_count: records,
            duplicate_clusters: 0,
            duplicate_records: 0,
            unique_records: records,
            blocks: 0,
            blocking: None,
            comparisons: 0,
            matched_pairs: 0,
            timings: Default::default(),
        },
    }
}

fn write_single_output(
    output_dir: &Path,
    source_system: &str,
    bundle: &OutputBundle,
) -> Result<PathBuf> {
    let sheets: Vec<(String, &Table)> = vec![
        (format!("{source_system}_final"), &bundle.final_rows),
        (format!("{source_system}_winner"), &bundle.winner_rows),
        (format!("{source_system}_duplicates"), &bundle.duplicate_rows),
        (format!("{source_system}_unique"), &bundle.unique_rows),
    ];
    io::write_workbook(&output_dir.join(format!("{source_system}_Output.xlsx")), &sheets)
}

// ============ cross ============

fn cmd_cross(
    files: &[PathBuf],
    matching: &MatchOptions,
    precedence_path: &Path,
    output_dir: &Path,
    json: bool,
) -> Result<()> {
    if files.is_empty() {
        bail!("no input files given");
    }
    let config = matching.resolve()?;
    let precedence = PrecedenceMap::load(precedence_path)?;

    let mut combined = Table::default();
    let mut per_source: Vec<(String, Table)> = Vec::new();
    for file in files {
        let (source_system, mut table) = read_cross_input(file)?;
        if !table.has_column(SOURCE_SYSTEM_COLUMN) {
            let tags = vec![Value::Str(source_system.clone()); table.row_count()];
            table.add_column(SOURCE_SYSTEM_COLUMN, tags);
        }
        combined.append(&table);
        per_source.push((format!("{source_system}_final"), table));
    }
    tracing::info!(
        records = combined.row_count(),
        sources = per_source.len(),
        "combined cross-system input"
    );

    let mut combined_sheets: Vec<(String, &Table)> = per_source
        .iter()
        .map(|(name, table)| (name.clone(), table))
        .collect();
    combined_sheets.push(("crosssystem_input".to_string(), &combined));
    io::write_workbook(
        &output_dir.join("All_Final_Sheets_Combined.xlsx"),
        &combined_sheets,
    )?;

    let bundle = deduplicate_cross(&combined, &config, &precedence)
        .context("Cross-system deduplication failed")?;

    let out_sheets: Vec<(String, &Table)> = vec![
        ("crosssystem_final".to_string(), &bundle.final_rows),
        ("winners_only".to_string(), &bundle.winner_rows),
        ("all_duplicates".to_string(), &bundle.duplicate_rows),
        ("uniques".to_string(), &bundle.unique_rows),
    ];
    let output_path =
        io::write_workbook(&output_dir.join("CrossSystem_Winner_Output.xlsx"), &out_sheets)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle.stats)?);
    } else {
        print_summary("cross-system", &bundle.stats, &output_path);
    }
    Ok(())
}

/// Read a cross-mode input. A workbook produced by `single` contributes its
/// `<src>_final` sheet; anything else is read whole.
fn read_cross_input(file: &Path) -> Result<(String, Table)> {
    let stem = io::source_system_from_path(file);
    let source_system = stem.strip_suffix("_Output").unwrap_or(&stem).to_string();

    let is_workbook = matches!(
        file.extension().and_then(|e| e.to_str()),
        Some("xlsx") | Some("xlsm") | Some("xls") | Some("ods")
    );
    if is_workbook {
        let final_sheet = io::truncate_sheet_name(&format!("{source_system}_final"));
        if io::sheet_names(file)?.contains(&final_sheet) {
            let table = io::read_sheet(file, &final_sheet)?;
            return Ok((source_system, table));
        }
    }
    let table =
        io::read_table(file).with_context(|| format!("Failed to read {}", file.display()))?;
    Ok((source_system, table))
}

// ============ synth ============

fn cmd_synth(rows: usize, dup_fraction: f64, seed: u64, output: &Path) -> Result<()> {
    let table = fuzzydup::synth::generate(rows, dup_fraction, seed);
    io::write_csv(output, &table)?;
    println!(
        "{} {} rows (seed {seed}, ~{:.0}% duplicates) -> {}",
        "Generated".green().bold(),
        table.row_count(),
        dup_fraction * 100.0,
        output.display()
    );
    Ok(())
}

// ============ outputs ============

fn cmd_outputs(action: &OutputsAction, output_dir: &Path) -> Result<()> {
    let mut registry = OutputRegistry::load(output_dir)?;
    match action {
        OutputsAction::List => {
            if registry.is_empty() {
                println!("No recorded outputs in {}", output_dir.display());
                return Ok(());
            }
            for entry in &registry.outputs {
                println!(
                    "{}  {} -> {}  ({} -> {} records, {})",
                    entry.source_system.bold(),
                    entry.input_file.display(),
                    entry.output_file.display(),
                    entry.records_in,
                    entry.records_out,
                    entry.processed_at
                );
            }
        }
        OutputsAction::Clear => {
            let count = registry.len();
            for entry in &registry.outputs {
                if let Err(e) = std::fs::remove_file(&entry.output_file) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %entry.output_file.display(),
                            error = %e,
                            "failed to delete output file"
                        );
                    }
                }
            }
            registry.clear();
            registry.save(output_dir)?;
            println!("Cleared {count} recorded outputs");
        }
    }
    Ok(())
}

// ============ display ============

fn print_summary(label: &str, stats: &RunStats, output_path: &Path) {
    println!("{} {}", "Processed".green().bold(), label);
    println!(
        "  records: {} -> {}  ({} duplicate records in {} clusters)",
        stats.input_records,
        stats.final_records,
        stats.duplicate_records,
        stats.duplicate_clusters
    );
    println!(
        "  blocks: {}  comparisons: {}  matched pairs: {}",
        stats.blocks, stats.comparisons, stats.matched_pairs
    );
    let t = &stats.timings;
    println!(
        "  timings: normalize {}ms, block {}ms, score {}ms, cluster {}ms, elect {}ms",
        t.normalize_ms, t.block_ms, t.score_ms, t.cluster_ms, t.elect_ms
    );
    println!("  output: {}", output_path.display());
}

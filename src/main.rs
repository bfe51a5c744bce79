use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pombe_loader::db::{collection_stats, count_by_kind, get_events};
use pombe_loader::{
    Loader, LoaderConfig, MemoryPersister, Persister, RunReport, SourceKind, SqlitePersister,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pombe-loader", version, about = "Load pombe data files into an entity store")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one or more data files in a single run
    Load {
        /// SQLite database to write to
        #[arg(long, default_value = "pombe.db", conflicts_with = "dry_run")]
        db: PathBuf,

        /// Run against an in-memory store and only print the report
        #[arg(long)]
        dry_run: bool,

        /// JSON file with scope/membership overrides
        #[arg(long)]
        config: Option<PathBuf>,

        /// Stop each file after this many records
        #[arg(long)]
        row_limit: Option<usize>,

        /// Source type for every file instead of detecting it from the name
        #[arg(long)]
        source: Option<SourceKind>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show what a database contains
    Summary {
        #[arg(long, default_value = "pombe.db")]
        db: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("pombe_loader={}", default_level))),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Load {
            db,
            dry_run,
            config,
            row_limit,
            source,
            json,
            files,
        } => {
            let mut config = match config {
                Some(path) => LoaderConfig::from_file(&path)?,
                None => LoaderConfig::default(),
            };
            if row_limit.is_some() {
                config.row_limit = row_limit;
            }

            let report = if dry_run {
                run_load(Loader::from_config(&config, MemoryPersister::new())?, &files, source)?
            } else {
                let persister = SqlitePersister::open(&db)?;
                run_load(Loader::from_config(&config, persister)?, &files, source)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            if let Some(reason) = &report.aborted {
                bail!("Run aborted: {}", reason);
            }
            if report.patch_failures() > 0 {
                bail!("{} collection patches failed", report.patch_failures());
            }
        }
        Command::Summary { db } => run_summary(&db)?,
    }

    Ok(())
}

fn run_load<P: Persister>(
    mut loader: Loader<P>,
    files: &[PathBuf],
    source: Option<SourceKind>,
) -> Result<RunReport> {
    for path in files {
        if let Err(err) = loader.load_path(path, source) {
            tracing::error!(error = %format!("{:#}", err), "stopping run");
            break;
        }
    }

    let (report, _) = loader.finish();
    Ok(report)
}

fn print_report(report: &RunReport) {
    println!("📦 Run {}", report.run_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for file in &report.files {
        let status = if file.fatal.is_some() {
            "❌"
        } else if file.is_clean() {
            "✓"
        } else {
            "⚠️"
        };
        println!(
            "{} {} ({}): {} read, {} skipped, {} created, {} patches",
            status,
            file.name,
            file.source,
            file.records_read,
            file.records_skipped,
            file.stats.total_created(),
            file.finalize.patches_issued,
        );
        for diagnostic in &file.diagnostics {
            println!("    {}", diagnostic);
        }
        if let Some(fatal) = &file.fatal {
            println!("    fatal: {}", fatal);
        }
    }

    println!(
        "📚 Vocabulary: {} created, {} patches",
        report.vocabulary_stats.total_created(),
        report.vocabulary.as_ref().map_or(0, |v| v.patches_issued),
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if report.is_success() {
        println!("✅ {} patches issued, {} diagnostics", report.patches_issued(), report.diagnostics());
    } else {
        println!(
            "❌ {} patch failures{}",
            report.patch_failures(),
            report
                .aborted
                .as_ref()
                .map(|r| format!(", aborted: {}", r))
                .unwrap_or_default()
        );
    }
}

fn run_summary(db: &Path) -> Result<()> {
    if !db.exists() {
        bail!("Database not found: {}", db.display());
    }
    let persister = SqlitePersister::open(db).context("Failed to open database")?;
    let conn = persister.connection();

    println!("🗄️  {}", db.display());
    println!("\nEntities:");
    for (kind, count) in count_by_kind(conn)? {
        println!("  {:<22} {}", kind, count);
    }

    println!("\nCollections:");
    for (name, (owners, members)) in collection_stats(conn)? {
        println!("  {:<22} {} owners, {} members", name, owners, members);
    }

    let events = get_events(conn)?;
    println!("\nEvents: {}", events.len());
    if let Some(last) = events.last() {
        println!("  last: {} at {}", last.event_type, last.timestamp.to_rfc3339());
    }

    Ok(())
}

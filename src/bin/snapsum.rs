//! # snapsum CLI
//!
//! ## Usage
//! ```bash
//! # Record the first state of the current directory
//! snapsum init
//!
//! # What changed since the last state?
//! snapsum status -v
//!
//! # Store the current state
//! snapsum ci -m "after import"
//!
//! # List duplicates and pick the ones to delete
//! snapsum fdup --remove
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use snapsum::hashing::progress_char;
use snapsum::report;
use snapsum::{
    format_bytes, AutoAccept, CommandOptions, CompressionStrategy, HashMode, LinePrompt,
    ManageOptions, ProgressCallback, ProgressInfo, Repository, RepositoryBuilder, SelectionPrompt,
    SnapsumError,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Symbols kept on the spinner line
const PROGRESS_TAIL: usize = 60;

/// snapsum - record checksum states of a directory and see what changed
#[derive(Parser)]
#[command(name = "snapsum")]
#[command(version)]
#[command(about = "Record checksum states of a directory tree and report what changed")]
#[command(long_about = None)]
struct Cli {
    /// Directory to run in (defaults to current directory); the repository
    /// is looked for there and in its parents
    #[arg(short = 'C', long = "directory", global = true)]
    directory: Option<PathBuf>,

    /// Print every modified file or duplicate set
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Answer yes to every prompt
    #[arg(short = 'y', long = "yes", global = true)]
    always_yes: bool,

    /// Comment stored with the state
    #[arg(short, long, global = true)]
    message: Option<String>,

    /// Hash mode: none, small-block, medium-block or full
    #[arg(short = 'H', long = "hash-mode", global = true)]
    hash_mode: Option<HashMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository and record the first state
    Init {
        /// Compression of the state files
        #[arg(long, value_enum, default_value = "fast")]
        compression: CompressionMode,

        /// Ignore patterns (gitignore syntax)
        #[arg(short, long)]
        ignore: Vec<String>,

        /// Follow symbolic links
        #[arg(long)]
        follow_symlinks: bool,
    },

    /// Compare with the last state and store the result
    #[command(alias = "ci")]
    Commit,

    /// Compare with the last state without storing anything
    #[command(aliases = ["st", "diff"])]
    Status,

    /// List stored states
    Log,

    /// Remove the last stored state
    #[command(alias = "rbk")]
    Rollback,

    /// Find duplicate files
    #[command(alias = "fdup")]
    FindDuplicates {
        /// Delete duplicates, asking which files to keep unless -y is given
        #[arg(short, long)]
        remove: bool,
    },

    /// List the files left out by ignore rules
    #[command(alias = "dign")]
    DisplayIgnored,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum CompressionMode {
    None,
    Fast,
}

impl From<CompressionMode> for CompressionStrategy {
    fn from(mode: CompressionMode) -> Self {
        match mode {
            CompressionMode::None => CompressionStrategy::None,
            CompressionMode::Fast => CompressionStrategy::Fast,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        let message = match e.downcast_ref::<SnapsumError>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("{}: {}", "Error".red().bold(), message);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let root_path = cli.directory.clone().unwrap_or_else(|| PathBuf::from("."));
    let options = CommandOptions {
        hash_mode: cli.hash_mode,
        comment: cli.message.clone().unwrap_or_default(),
        verbose: cli.verbose,
        always_yes: cli.always_yes,
        remove_duplicates: matches!(cli.command, Commands::FindDuplicates { remove: true }),
    };

    match cli.command {
        Commands::Init {
            compression,
            ignore,
            follow_symlinks,
        } => cmd_init(&root_path, &options, compression, ignore, follow_symlinks),
        Commands::Commit => cmd_commit(&root_path, &options),
        Commands::Status => cmd_status(&root_path, &options),
        Commands::Log => cmd_log(&root_path),
        Commands::Rollback => cmd_rollback(&root_path),
        Commands::FindDuplicates { .. } => cmd_find_duplicates(&root_path, &options),
        Commands::DisplayIgnored => cmd_display_ignored(&root_path),
    }
}

/// Create `.snapsum` and store state 1
///
/// An existing repository is reported and left alone.
fn cmd_init(
    root_path: &Path,
    options: &CommandOptions,
    compression: CompressionMode,
    ignore: Vec<String>,
    follow_symlinks: bool,
) -> anyhow::Result<()> {
    println!("{}", "Initializing snapsum repository...".blue().bold());

    let comment = if options.comment.is_empty() {
        "Initial state".to_string()
    } else {
        options.comment.clone()
    };
    let start = Instant::now();
    let (spinner, callback) = spinner();
    let outcome = RepositoryBuilder::new()
        .hash_mode(options.hash_mode.unwrap_or_default())
        .compression(compression.into())
        .ignore_patterns(ignore)
        .follow_symlinks(follow_symlinks)
        .progress(callback)
        .init(root_path, &comment);
    spinner.finish_and_clear();

    let (repository, result) = match outcome {
        Ok(created) => created,
        Err(SnapsumError::RepositoryAlreadyExists(path)) => {
            println!("Repository already exists at {}", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut out = io::stdout();
    report::write_compare_result(&mut out, &result, options.verbose)?;
    println!(
        "{} Initialized repository in {}",
        "✓".green().bold(),
        repository.repository_dir().display().to_string().cyan()
    );
    println!(
        "  State #1: {} files, hash mode {}",
        result.current.file_count.to_string().cyan(),
        repository.settings().global_hash_mode.to_string().cyan()
    );
    println!("  Time: {}", elapsed(start).cyan());
    Ok(())
}

fn cmd_commit(root_path: &Path, options: &CommandOptions) -> anyhow::Result<()> {
    let (spinner, callback) = spinner();
    let repository = Repository::discover(root_path)?.with_progress(callback);

    let start = Instant::now();
    let result = repository.commit(options);
    spinner.finish_and_clear();
    let result = result?;

    report::write_compare_result(&mut io::stdout(), &result, options.verbose)?;
    match result.state_number {
        Some(number) => {
            println!(
                "{} Stored state #{}",
                "✓".green().bold(),
                number.to_string().yellow().bold()
            );
            if !options.comment.is_empty() {
                println!("  Comment: {}", options.comment.cyan());
            }
        }
        None => println!("Nothing to commit"),
    }
    println!("  Time: {}", elapsed(start).cyan());
    Ok(())
}

fn cmd_status(root_path: &Path, options: &CommandOptions) -> anyhow::Result<()> {
    let (spinner, callback) = spinner();
    let repository = Repository::discover(root_path)?.with_progress(callback);

    let result = repository.status(options);
    spinner.finish_and_clear();
    let result = result?;

    if let Some(number) = result.previous_state_number {
        let scope = repository
            .scope()
            .map(|scope| format!("{} ", scope.display()))
            .unwrap_or_default();
        println!(
            "{}",
            format!("Comparing {}with state #{} ({})", scope, number, result.hash_mode).dimmed()
        );
    }
    report::write_compare_result(&mut io::stdout(), &result, options.verbose)?;
    Ok(())
}

fn cmd_log(root_path: &Path) -> anyhow::Result<()> {
    let repository = Repository::discover(root_path)?;
    let entries = repository.log()?;
    if entries.is_empty() {
        println!("{}", "No state stored.".yellow());
        return Ok(());
    }
    report::write_log(&mut io::stdout(), &entries)?;
    Ok(())
}

fn cmd_rollback(root_path: &Path) -> anyhow::Result<()> {
    let repository = Repository::discover(root_path)?;
    match repository.rollback()? {
        Some(number) => println!("{} Removed state #{}", "✓".green().bold(), number),
        None => println!("{}", "No state to roll back, the initial state is kept.".yellow()),
    }
    Ok(())
}

fn cmd_find_duplicates(root_path: &Path, options: &CommandOptions) -> anyhow::Result<()> {
    let (spinner, callback) = spinner();
    let repository = Repository::discover(root_path)?.with_progress(callback);

    println!("Searching for duplicated files");
    let result = repository.find_duplicates(options);
    spinner.finish_and_clear();
    let mut result = result?;

    let mut prompt: Box<dyn SelectionPrompt> = if options.always_yes {
        Box::new(AutoAccept)
    } else {
        Box::new(LinePrompt::new(io::stdin().lock(), io::stdout()))
    };
    let manage = ManageOptions {
        verbose: options.verbose,
        remove: options.remove_duplicates,
    };

    let mut out = io::stdout();
    result
        .manage(repository.root(), manage, prompt.as_mut(), &mut out)
        .context("Duplicate removal failed")?;
    out.flush()?;
    Ok(())
}

fn cmd_display_ignored(root_path: &Path) -> anyhow::Result<()> {
    let repository = Repository::discover(root_path)?;
    let ignored = repository.ignored_files()?;
    if ignored.is_empty() {
        println!("No ignored file");
        return Ok(());
    }
    for path in &ignored {
        println!("{}", path.display());
    }
    println!("{}", format!("{} ignored files", ignored.len()).dimmed());
    Ok(())
}

/// Spinner showing one symbol per hashed file and the bytes read so far
fn spinner() -> (ProgressBar, ProgressCallback) {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("Scanning files...");
    pb.enable_steady_tick(Duration::from_millis(120));

    let symbols = Arc::new(Mutex::new(String::new()));
    let bar = pb.clone();
    let callback: ProgressCallback = Arc::new(move |info: ProgressInfo| {
        let mut symbols = symbols.lock();
        symbols.push(progress_char(i64::try_from(info.item_bytes).unwrap_or(i64::MAX)));
        if symbols.len() > PROGRESS_TAIL {
            symbols.remove(0);
        }
        bar.set_message(format!(
            "{} {} files, {}",
            symbols,
            info.processed,
            format_bytes(info.bytes_processed)
        ));
    });
    (pb, callback)
}

fn elapsed(start: Instant) -> String {
    let millis = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    format_duration(Duration::from_millis(millis)).to_string()
}

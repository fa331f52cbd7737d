//! CLI entry point for `mailstrip`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mailstrip::config::{self, Config};
use mailstrip::error::StripError;
use mailstrip::parser::mime;
use mailstrip::process::{BatchOptions, BatchReport, Outcome, Processor};
use mailstrip::store::folder::DirectoryStore;
use mailstrip::store::mailbox::Mailbox;
use mailstrip::strip::{strip_attachments, StripConfig, StrippedMessage};

#[derive(Parser)]
#[command(
    name = "mailstrip",
    version,
    about = "Strip attachments out of large email messages, keeping the body"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Strip every message of an MBOX file that matches a query
    Run {
        mbox: PathBuf,
        /// Search query, e.g. "larger:5M before:2024"
        #[arg(short, long)]
        query: Option<String>,
        /// Folder attachments are saved into
        #[arg(long)]
        folder: Option<String>,
        /// Process at most this many messages
        #[arg(short, long)]
        limit: Option<usize>,
        /// Only report what would change
        #[arg(long)]
        dry_run: bool,
        /// Rebuild the index even if one already exists
        #[arg(short, long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },
    /// Strip a single message file
    Strip {
        eml: PathBuf,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show how a message file would be stripped
    Inspect {
        eml: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write a default configuration file
        #[arg(long)]
        init: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Run {
            mbox,
            query,
            folder,
            limit,
            dry_run,
            force,
            json,
        } => {
            let mut options = BatchOptions::from(&config.run);
            if let Some(query) = query {
                options.query = query;
            }
            if let Some(folder) = folder {
                options.folder = folder;
            }
            if let Some(limit) = limit {
                options.limit = limit;
            }
            options.dry_run |= dry_run;
            cmd_run(&mbox, options, force, json, &config)
        }
        Commands::Strip { eml, output } => cmd_strip(&eml, output.as_deref(), &config),
        Commands::Inspect { eml, json } => cmd_inspect(&eml, json, &config),
        Commands::Config { init } => cmd_config(init, &config),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "mailstrip.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Strip every matching message of an MBOX file.
fn cmd_run(
    path: &Path,
    options: BatchOptions,
    force: bool,
    json: bool,
    config: &Config,
) -> anyhow::Result<()> {
    if !path.exists() {
        return Err(StripError::FileNotFound(path.to_path_buf()).into());
    }
    let strip_config = StripConfig::from_settings(&config.strip)?;

    let file_size = std::fs::metadata(path)?.len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Indexing [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let mut mailbox = Mailbox::open(
        path,
        force,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    // An absolute folder becomes the store root itself
    let (mut files, folder) = if Path::new(&options.folder).is_absolute() {
        (DirectoryStore::new(&options.folder), ".".to_string())
    } else {
        (DirectoryStore::new("."), options.folder.clone())
    };
    let options = BatchOptions { folder, ..options };

    let processor = Processor::new(&strip_config, &config.attachments, options);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Stripping [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    let start = Instant::now();
    let result = processor.run(
        &mut mailbox,
        &mut files,
        Some(&|done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        }),
    );
    pb.finish_and_clear();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_table(&report, start.elapsed());
    }
    Ok(())
}

/// Strip one message file.
fn cmd_strip(path: &Path, output: Option<&Path>, config: &Config) -> anyhow::Result<()> {
    let (_, stripped) = strip_file(path, config)?;

    for warning in &stripped.warnings {
        eprintln!("  warning: {warning}");
    }

    match output {
        Some(out) => {
            std::fs::write(out, &stripped.raw)
                .with_context(|| format!("Cannot write {}", out.display()))?;
            eprintln!(
                "  {} -> {} ({} removed)",
                format_size(stripped.original_len, BINARY),
                format_size(stripped.raw.len(), BINARY),
                format_size(stripped.bytes_removed(), BINARY),
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&stripped.raw)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Report what stripping a message file would do.
fn cmd_inspect(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let (raw, stripped) = strip_file(path, config)?;
    let attachments = mime::extract_attachments(&raw).unwrap_or_default();

    if json {
        let atts: Vec<serde_json::Value> = attachments
            .iter()
            .map(|a| {
                serde_json::json!({
                    "filename": a.filename,
                    "content_type": a.content_type,
                    "size": a.size(),
                })
            })
            .collect();
        let report = serde_json::json!({
            "file": path.to_string_lossy(),
            "body": stripped.body,
            "boundary": stripped.boundary,
            "cut": stripped.cut,
            "original_size": stripped.original_len,
            "stripped_size": stripped.raw.len(),
            "excision": stripped.excision,
            "warnings": stripped.warnings,
            "attachments": atts,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {:<16} {}", "File", path.display());
    println!("  {:<16} {:?}", "Body", stripped.body);
    println!("  {:<16} {}", "Boundary", stripped.boundary);
    println!("  {:<16} {:?}", "Cut", stripped.cut);
    println!(
        "  {:<16} {} -> {}",
        "Size",
        format_size(stripped.original_len, BINARY),
        format_size(stripped.raw.len(), BINARY)
    );
    if let Some(ref excision) = stripped.excision {
        println!(
            "  {:<16} {} section(s), {} -> {}",
            "Second pass",
            excision.sections,
            format_size(excision.before, BINARY),
            format_size(excision.after, BINARY)
        );
    }
    for att in &attachments {
        println!(
            "  {:<16} {} ({}, {})",
            "Attachment",
            att.filename,
            att.content_type,
            format_size(att.size(), BINARY)
        );
    }
    for warning in &stripped.warnings {
        println!("  {:<16} {warning}", "Warning");
    }
    println!();
    Ok(())
}

fn strip_file(path: &Path, config: &Config) -> anyhow::Result<(Vec<u8>, StrippedMessage)> {
    let raw = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StripError::FileNotFound(path.to_path_buf())
        } else {
            StripError::io(path, e)
        }
    })?;
    let strip_config = StripConfig::from_settings(&config.strip)?;
    let stripped = strip_attachments(&raw, &strip_config)
        .with_context(|| format!("Cannot strip {}", path.display()))?;
    Ok((raw, stripped))
}

/// Print the effective configuration, or write the defaults.
fn cmd_config(init: bool, config: &Config) -> anyhow::Result<()> {
    if init {
        if let Some(path) = config::config_file_path().filter(|p| p.exists()) {
            anyhow::bail!("Config file already exists: {}", path.display());
        }
        let path = config::save_config(&Config::default())?;
        println!("  Wrote {}", path.display());
        return Ok(());
    }

    match config::config_file_path() {
        Some(path) if path.exists() => println!("# {}", path.display()),
        _ => println!("# built-in defaults"),
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailstrip", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::stdout().write_all(&buf)?;
    Ok(())
}

/// Print a batch report as a human-readable table.
fn print_report_table(report: &BatchReport, elapsed: std::time::Duration) {
    println!();
    if report.messages.is_empty() {
        println!("  No matching messages");
        println!();
        return;
    }

    println!(
        "  {:<4} {:<10} {:<44} {:>10} {:>10} {:>5}",
        "#", "Outcome", "Subject", "Before", "After", "Files"
    );
    println!("  {}", "-".repeat(90));

    for (i, msg) in report.messages.iter().enumerate() {
        let outcome = match msg.outcome {
            Outcome::Stripped => "stripped",
            Outcome::WouldStrip => "would",
            Outcome::AlreadyStripped => "skipped",
        };
        let subject: String = msg.subject.chars().take(43).collect();
        println!(
            "  {:<4} {:<10} {:<44} {:>10} {:>10} {:>5}",
            i + 1,
            outcome,
            subject,
            format_size(msg.original_size, BINARY),
            format_size(msg.stripped_size, BINARY),
            msg.attachments.len()
        );
        for warning in &msg.warnings {
            println!("       ! {warning}");
        }
    }

    println!();
    let verb = if report.dry_run { "would strip" } else { "stripped" };
    println!(
        "  {} of {} message(s) {verb}, {} already stripped, {} attachment(s) saved, {} freed in {:.2?}",
        report.stripped,
        report.matched,
        report.already_stripped,
        report.attachments_saved,
        format_size(report.bytes_removed, BINARY),
        elapsed
    );
    if report.warnings > 0 {
        println!("  {} warning(s), re-check those messages", report.warnings);
    }
    println!();
}

//! xsync - incremental X timeline mirroring CLI
//!
//! Main entry point for the xsync command-line tool.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

use xsync::logging::init_cli_logging;
use xsync::sync::ItemOutcome;
use xsync::*;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", format_sync_error("Invalid configuration", &err));
            return ExitCode::FAILURE;
        }
    };

    if !config.output.colors {
        colored::control::set_override(false);
    }
    init_cli_logging(
        cli.quiet || config.output.quiet,
        cli.verbose,
        cli.log_level,
        config.output.colors,
    );

    let outcome = match &cli.command {
        Commands::Sync(args) => cmd_sync(&cli, &config, args).await,
        Commands::Stats(args) => cmd_stats(&cli, &config, args),
        Commands::Config(args) => cmd_config(&cli, &config, args),
        Commands::Completions(args) => cmd_completions(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}

fn render_error(err: &anyhow::Error) -> String {
    err.downcast_ref::<SyncError>().map_or_else(
        || format_error("Error", &format!("{err:#}"), &[]),
        |sync_err| {
            let title = if sync_err.is_config_error() {
                "Configuration problem"
            } else if sync_err.is_upstream_error() {
                "Timeline request failed"
            } else {
                "Sync failed"
            };
            format_sync_error(title, sync_err)
        },
    )
}

fn get_db_path(cli: &Cli, config: &Config, screen_name: &str) -> PathBuf {
    cli.db
        .clone()
        .unwrap_or_else(|| config.db_path_for(screen_name))
}

fn ensure_parent_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SyncError::storage_init(parent, e))?;
    }
    Ok(())
}

async fn cmd_sync(cli: &Cli, config: &Config, args: &SyncArgs) -> Result<()> {
    let screen_name = validate_screen_name(&args.screen_name)?;

    // Credentials and settings are checked before touching disk or network.
    let credentials = Credentials::from_env()?;

    let mut api = config.api.clone();
    if let Some(page_size) = args.page_size {
        api.page_size = page_size;
    }
    if let Some(sleep_ms) = args.sleep_ms {
        api.sleep_ms = sleep_ms;
    }
    if let Some(base) = &args.api_base {
        api.base_url.clone_from(base);
    }
    api.validate()?;

    let db_path = get_db_path(cli, config, &screen_name);
    ensure_parent_dir(&db_path)?;
    let storage = Storage::open(&db_path, &screen_name)?;
    let client = TimelineClient::new(&api, &credentials, &screen_name)?;

    info!(
        screen_name = %screen_name,
        db = %db_path.display(),
        endpoint = %client.endpoint(),
        "Starting sync"
    );

    let text_output = cli.format == OutputFormat::Text;
    let show_items = text_output && !cli.quiet && !config.output.quiet;
    if show_items {
        let heading = "Syncing timeline of".bold().cyan();
        println!("{heading} @{}", screen_name.bold());
        println!("  Database: {}", db_path.display());
        println!();
    }

    let options = SyncOptions {
        page_size: api.page_size,
        sleep: api.sleep(),
    };
    let mut observer = CliObserver::new(show_items);
    let result = Syncer::new(&client, &storage, options)
        .run_with(&mut observer)
        .await;
    observer.finish();
    let summary = result?;

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let value = serde_json::json!({
                "screen_name": screen_name,
                "database": db_path,
                "new": summary.new_count,
                "known": summary.known_count,
                "pages": summary.pages,
            });
            print_json(&value, cli.format)?;
        }
        OutputFormat::Text => {
            println!();
            println!(
                "{} {} new {} added to the database, {} already known.",
                "FINISHED!".bold().green(),
                format_count(summary.new_count).cyan(),
                if summary.new_count == 1 { "entry" } else { "entries" },
                format_count(summary.known_count).dimmed()
            );
        }
    }

    Ok(())
}

fn cmd_stats(cli: &Cli, config: &Config, args: &StatsArgs) -> Result<()> {
    let screen_name = validate_screen_name(&args.screen_name)?;
    let db_path = get_db_path(cli, config, &screen_name);

    if !db_path.exists() {
        anyhow::bail!(
            "No database for @{screen_name}. Run 'xsync sync --screen-name {screen_name}' first.\n\
             Expected database at: {}",
            db_path.display()
        );
    }

    let storage = Storage::open(&db_path, &screen_name)
        .with_context(|| format!("Failed to open {}", db_path.display()))?;
    let stats = storage.stats(&screen_name)?;

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(&stats, cli.format)?,
        OutputFormat::Text => {
            println!("{}", format!("Timeline of @{screen_name}").bold().cyan());
            println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
            println!("  {:<14} {:>20}", "Posts:", format_number(stats.records));
            println!("  {:<14} {:>20}", "Table:", stats.table);
            if let (Some(newest), Some(oldest)) = (&stats.newest_id, &stats.oldest_id) {
                println!("  {:<14} {:>20}", "Newest id:", newest.green());
                println!("  {:<14} {:>20}", "Oldest id:", oldest.green());
            }
            println!("{}", "─".repeat(CONTENT_DIVIDER_WIDTH));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config, args: &ConfigArgs) -> Result<()> {
    if args.path {
        match Config::user_config_path() {
            Some(path) => println!("{}", path.display()),
            None => anyhow::bail!("No config directory could be determined for this platform"),
        }
        return Ok(());
    }

    if args.default {
        print!("{}", Config::default_config_content());
        return Ok(());
    }

    match cli.format {
        OutputFormat::Json | OutputFormat::JsonPretty => print_json(config, cli.format)?,
        OutputFormat::Text => {
            let content = toml::to_string_pretty(config).context("Failed to render config")?;
            print!("{content}");
        }
    }
    Ok(())
}

fn cmd_completions(args: &CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "xsync", &mut io::stdout());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let json = if format == OutputFormat::JsonPretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

const SPINNER_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {msg}";

/// Prints one line per post and keeps a spinner on the current page.
struct CliObserver {
    progress: ProgressBar,
    show_items: bool,
}

impl CliObserver {
    fn new(show_items: bool) -> Self {
        let progress = if show_items {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template(SPINNER_TEMPLATE) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb.set_message("Fetching newest page...");
            pb
        } else {
            ProgressBar::hidden()
        };
        Self {
            progress,
            show_items,
        }
    }

    fn finish(&self) {
        self.progress.finish_and_clear();
    }
}

impl SyncObserver for CliObserver {
    fn on_item(&mut self, record: &Record, outcome: ItemOutcome) {
        if !self.show_items {
            return;
        }
        let line = match outcome {
            ItemOutcome::Stored(local_id) => format!(
                "  {} {} stored as #{}  {}",
                "✓".green(),
                record.external_id.dimmed(),
                local_id,
                truncate(&record.text, 60)
            ),
            ItemOutcome::Known => format!(
                "  {} {} already in db",
                "·".dimmed(),
                record.external_id.dimmed()
            ),
        };
        self.progress.suspend(|| println!("{line}"));
    }

    fn on_page(&mut self, page: u64, items: usize, summary: &SyncSummary) {
        debug!(page, items, "Page processed");
        self.progress.set_message(format!(
            "Page {page} done ({} new, {} known), fetching older posts...",
            summary.new_count, summary.known_count
        ));
    }
}

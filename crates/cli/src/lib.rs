pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dealdesk_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Parser)]
#[command(
    name = "dealdesk",
    about = "DealDesk operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations, and manage saved wizard drafts.",
    after_help = "Examples:\n  dealdesk doctor --json\n  dealdesk config\n  dealdesk drafts purge"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a dealdesk.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config {
        #[arg(long, help = "Emit the redacted configuration as JSON")]
        json: bool,
    },
    #[command(about = "Validate config, API client readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "List or purge saved wizard drafts")]
    Drafts(DraftsCommand),
}

#[derive(Debug, Subcommand)]
enum DraftsCommand {
    #[command(about = "List saved drafts, newest first")]
    List,
    #[command(about = "Delete drafts captured before the staleness window")]
    Purge {
        #[arg(long, help = "Override drafts.staleness_days for this run")]
        older_than_days: Option<u32>,
    },
}

pub fn load_options(config_path: Option<PathBuf>) -> LoadOptions {
    let require_file = config_path.is_some();
    LoadOptions { config_path, require_file, ..LoadOptions::default() }
}

/// Installs the global subscriber on stderr so stdout stays reserved for
/// command output.
pub fn init_logging(config: &AppConfig) {
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let installed = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(event_name = "cli.logging_already_initialized", "subscriber already set");
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = load_options(cli.config);

    if let Ok(config) = AppConfig::load(options.clone()) {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Config { json } => commands::config::run(&options, json),
        Command::Doctor { json } => commands::doctor::run(&options, json),
        Command::Drafts(DraftsCommand::List) => commands::drafts::list(&options),
        Command::Drafts(DraftsCommand::Purge { older_than_days }) => {
            commands::drafts::purge(&options, older_than_days)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

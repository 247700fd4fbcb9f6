use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::app::App;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{
    AgendaArgs, CliContext, EditArgs, ExportArgs, HashPasswordArgs, IdArgs, ListArgs, NewArgs,
};

const LOG_FILE: &str = "lettercraft.log";

#[derive(Parser, Debug)]
#[command(
    name = "lettercraft",
    version,
    about = "Write, search and export formal letters from the terminal"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over LETTERCRAFT_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over LETTERCRAFT_DATA)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Account to sign in with; the password comes from LETTERCRAFT_PASSWORD or a prompt
    #[arg(long, global = true)]
    pub email: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Print one page of letters, newest first
    List(ListArgs),
    /// Print a single letter
    Show(IdArgs),
    /// Create a letter from flags (body from stdin when --body is omitted)
    New(NewArgs),
    /// Change fields of an existing letter
    Edit(EditArgs),
    /// Delete a letter
    Delete(IdArgs),
    /// Export a letter as PDF or DOCX
    Export(ExportArgs),
    /// Build an agenda over selected letters
    Agenda(AgendaArgs),
    /// Print the password digest for an [[accounts]] entry
    HashPassword(HashPasswordArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("LETTERCRAFT_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("LETTERCRAFT_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();

    let command = cli.command.unwrap_or(Commands::Tui);
    let log_file = matches!(command, Commands::Tui).then(|| paths.log_dir.join(LOG_FILE));
    init_tracing(&cli.log_level, log_file.as_deref())
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;

    if let Commands::HashPassword(args) = &command {
        print!("{}", commands::hash_password(args)?);
        return Ok(());
    }

    let config = Arc::new(loader.load_or_init()?);
    let storage = storage::init(&paths, &config.storage)?;

    if let Commands::Tui = command {
        let mut app = App::new(config, storage, &paths, cli.email)?;
        return app.run();
    }

    let user = commands::authenticate(&config, cli.email.as_deref())?;
    let ctx = CliContext {
        config,
        storage,
        user,
    };
    let output = match command {
        Commands::List(args) => commands::list_letters(&ctx, &args)?,
        Commands::Show(args) => commands::show_letter(&ctx, &args)?,
        Commands::New(args) => commands::new_letter(&ctx, args)?,
        Commands::Edit(args) => commands::edit_letter(&ctx, args)?,
        Commands::Delete(args) => commands::delete_letter(&ctx, &args)?,
        Commands::Export(args) => commands::export_letter(&ctx, &args)?,
        Commands::Agenda(args) => commands::agenda(&ctx, &args)?,
        Commands::Tui | Commands::HashPassword(_) => String::new(),
    };
    print!("{output}");
    Ok(())
}

/// Installs the global subscriber once; the TUI logs to a file so the screen stays clean.
fn init_tracing(level: &str, log_file: Option<&Path>) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        match log_file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("opening log file {}", path.display()))?;
                fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .init();
            }
            None => {
                fmt()
                    .with_env_filter(env_filter)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
    .map(|_| ())
}

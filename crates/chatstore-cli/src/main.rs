//! Chatstore Admin - operator tool for the chat application's data file
//!
//! # Usage
//! ```bash
//! chatstore-admin [--data data.json] [--backups backups] [--verbose]            # interactive menu
//! chatstore-admin delete-user alice --yes
//! chatstore-admin rename alice alice2
//! chatstore-admin status
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use chatstore_core::storage::atomic;
use chatstore_core::{
    probe, spawn_autosave, BackupPolicy, DocumentStore, LoadOutcome, StoreConfig, StoreError,
};

mod menu;
mod render;

use menu::{Menu, MenuExit};

/// Chatstore Admin - inspect and edit the chat application's data file
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Data file (default: data.json)
    #[arg(short, long, value_name = "FILE", env = "CHATSTORE_DATA", global = true)]
    data: Option<PathBuf>,

    /// Backup directory (default: backups)
    #[arg(short, long, value_name = "DIR", env = "CHATSTORE_BACKUPS", global = true)]
    backups: Option<PathBuf>,

    /// JSON configuration file, applied before environment and flags
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// What to do when the pre-change backup fails
    #[arg(long, value_enum, global = true)]
    backup_policy: Option<PolicyArg>,

    /// Name recorded in `meta.shield_disabled_by` while a change runs
    #[arg(long, value_name = "NAME", env = "CHATSTORE_ACTOR", global = true)]
    actor: Option<String>,

    /// Skip confirmation prompts for one-shot commands
    #[arg(short, long, global = true)]
    yes: bool,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive admin menu (the default)
    Shell,

    /// List users
    Users {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List chats
    Chats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Delete a user with their chats and contact requests
    DeleteUser { username: String },

    /// Delete one chat
    DeleteChat { chat_id: String },

    /// Rename a user everywhere the username appears
    Rename { old: String, new: String },

    /// Assign a new contact number (format C-123456)
    SetContact { username: String, contact: String },

    /// Take a backup of the data file
    Backup {
        #[arg(short, long, default_value = "manual backup")]
        note: String,
    },

    /// Rewrite the data file now
    Save,

    /// Report usernames referenced but not defined (read-only)
    Check {
        #[arg(long)]
        json: bool,
    },

    /// Show whether an admin override is in progress (read-only)
    Status,

    /// Print the effective configuration, or write it to a file
    Config {
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    BestEffort,
    Required,
}

impl From<PolicyArg> for BackupPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::BestEffort => BackupPolicy::BestEffort,
            PolicyArg::Required => BackupPolicy::Required,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so clap sees its variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(cli.verbose)
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    tracing::debug!(?config, "configuration resolved");

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => {
            let store = Arc::new(open_store(config)?);
            run_shell(store).await?;
        }
        Commands::Users { json } => {
            let users = open_store(config)?.list_users();
            if json {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else {
                println!("Users:");
                for user in &users {
                    println!("{}", render::user_line(user));
                }
            }
        }
        Commands::Chats { json } => {
            let chats = open_store(config)?.list_chats();
            if json {
                println!("{}", serde_json::to_string_pretty(&chats)?);
            } else {
                println!("Chats:");
                for chat in &chats {
                    println!("{}", render::chat_line(chat));
                }
            }
        }
        Commands::DeleteUser { username } => {
            let store = open_store(config)?;
            let target = Target::User(&username);
            if confirm_target(&store, target, cli.yes, &mut stdin(), &mut io::stdout())? {
                let report = store.delete_user(&username).map_err(fail)?;
                println!("{}", render::delete_user_summary(&username, &report).green());
            }
        }
        Commands::DeleteChat { chat_id } => {
            let store = open_store(config)?;
            let target = Target::Chat(&chat_id);
            if confirm_target(&store, target, cli.yes, &mut stdin(), &mut io::stdout())? {
                let removed = store.delete_chat(&chat_id).map_err(fail)?;
                println!(
                    "{}",
                    format!("Deleted chat '{chat_id}'. removed={removed}").green()
                );
            }
        }
        Commands::Rename { old, new } => {
            let store = open_store(config)?;
            let question = format!("Confirm rename '{old}' -> '{new}'?");
            if confirmed(cli.yes, &question, &mut stdin(), &mut io::stdout())? {
                let report = store.rename_user(&old, &new).map_err(fail)?;
                println!("{}", render::rename_summary(&old, &new, &report).green());
            }
        }
        Commands::SetContact { username, contact } => {
            let store = open_store(config)?;
            if confirmed(
                cli.yes,
                &format!("Confirm set contact number of '{username}' to {contact}?"),
                &mut stdin(),
                &mut io::stdout(),
            )? {
                let previous = store
                    .change_contact_number(&username, &contact)
                    .map_err(fail)?;
                println!(
                    "{}",
                    format!(
                        "Contact number for '{}' changed from {} to {}.",
                        username,
                        previous.as_deref().unwrap_or("(none)"),
                        contact
                    )
                    .green()
                );
            }
        }
        Commands::Backup { note } => {
            let record = open_store(config)?.backup(&note).map_err(fail)?;
            println!("Backup written: {}", record.path.display());
        }
        Commands::Save => {
            let store = open_store(config)?;
            store.force_save().map_err(fail)?;
            println!("Saved {}", store.data_path().display());
        }
        Commands::Check { json } => {
            let doc = atomic::read(&config.data_path)
                .with_context(|| format!("reading {}", config.data_path.display()))?
                .with_context(|| format!("{} does not exist", config.data_path.display()))?;
            let report = doc.integrity_report();
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in render::integrity_lines(&report) {
                    println!("{line}");
                }
            }
        }
        Commands::Status => {
            let state = probe(&config.data_path)
                .with_context(|| format!("reading {}", config.data_path.display()))?;
            let line = render::shield_line(state.as_ref());
            if state.is_some() {
                println!("{}", line.yellow().bold());
            } else {
                println!("{line}");
            }
        }
        Commands::Config { output } => match output {
            Some(path) => {
                config
                    .to_file(&path)
                    .with_context(|| format!("writing config {}", path.display()))?;
                println!("Configuration written to {}", path.display());
            }
            None => println!("{}", serde_json::to_string_pretty(&config)?),
        },
    }

    Ok(())
}

/// Defaults, then `--config`, then environment and flags
fn build_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => StoreConfig::new(),
    };
    if let Some(data) = &cli.data {
        config = config.with_data_path(data);
    }
    if let Some(backups) = &cli.backups {
        config = config.with_backup_dir(backups);
    }
    if let Some(policy) = cli.backup_policy {
        config = config.with_backup_policy(policy.into());
    }
    if let Some(actor) = &cli.actor {
        config = config.with_actor(actor.as_str());
    }
    Ok(config)
}

fn open_store(config: StoreConfig) -> anyhow::Result<DocumentStore> {
    let path = config.data_path.clone();
    let (store, outcome) = DocumentStore::open(config)
        .with_context(|| format!("opening {}", path.display()))?;
    report_outcome(&outcome, &path);
    Ok(store)
}

/// Data loss on recovery must never be silent
fn report_outcome(outcome: &LoadOutcome, path: &Path) {
    match outcome {
        LoadOutcome::Loaded => {}
        LoadOutcome::Created => eprintln!(
            "{} {} did not exist; created an empty document.",
            "note:".yellow().bold(),
            path.display()
        ),
        LoadOutcome::Recovered {
            reason,
            quarantined,
        } => {
            eprintln!("{}", "!".repeat(64).red().bold());
            eprintln!(
                "{} {} could not be read: {}",
                "WARNING:".red().bold(),
                path.display(),
                reason
            );
            eprintln!("Continuing with an EMPTY document. The next save replaces the file.");
            match quarantined {
                Some(copy) => eprintln!("The unreadable file was copied to {}", copy.display()),
                None => eprintln!("{}", "The unreadable file could NOT be copied aside.".red()),
            }
            eprintln!("{}", "!".repeat(64).red().bold());
        }
    }
}

fn stdin() -> io::StdinLock<'static> {
    io::stdin().lock()
}

fn confirmed<R: BufRead, W: Write>(
    skip: bool,
    question: &str,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<bool> {
    if skip {
        return Ok(true);
    }
    let ok = menu::confirm(input, output, question)?;
    if !ok {
        writeln!(output, "Aborted.")?;
    }
    Ok(ok)
}

/// What a one-shot delete points at
enum Target<'a> {
    User(&'a str),
    Chat(&'a str),
}

/// Existence is checked before the prompt, so a typo costs no confirmation
fn confirm_target<R: BufRead, W: Write>(
    store: &DocumentStore,
    target: Target<'_>,
    skip: bool,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<bool> {
    let question = match target {
        Target::User(name) => {
            if !store.has_user(name) {
                return Err(fail(StoreError::UserNotFound(name.to_string())));
            }
            format!("Confirm delete user '{name}' and all related chats/requests?")
        }
        Target::Chat(id) => {
            if !store.has_chat(id) {
                return Err(fail(StoreError::ChatNotFound(id.to_string())));
            }
            format!("Confirm delete chat '{id}'?")
        }
    };
    confirmed(skip, &question, input, output)
}

fn fail(err: StoreError) -> anyhow::Error {
    anyhow::anyhow!(render::error_message(&err))
}

async fn run_shell(store: Arc<DocumentStore>) -> anyhow::Result<()> {
    let autosave = spawn_autosave(Arc::clone(&store), store.config().autosave_interval());
    println!(
        "Admin tool {} started. Editing: {}",
        chatstore_core::VERSION,
        store.data_path().display().to_string().bold()
    );

    let menu_store = Arc::clone(&store);
    let menu = tokio::task::spawn_blocking(move || {
        Menu::new(&menu_store, io::stdin().lock(), io::stdout()).run()
    });

    // The menu thread blocks on stdin and cannot be cancelled, so an
    // interrupt exits the process after the final save instead of returning.
    let interrupted = tokio::select! {
        result = menu => {
            match result {
                Ok(Ok(MenuExit::Requested)) => println!("Exiting. Final save..."),
                Ok(Ok(MenuExit::EndOfInput)) => println!("\nInput closed. Saving and exiting..."),
                Ok(Err(e)) => eprintln!("{} terminal error: {e}", "error:".red().bold()),
                Err(e) => eprintln!("{} menu stopped: {e}", "error:".red().bold()),
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nInterrupted. Saving and exiting...");
            true
        }
    };

    let saved = autosave.shutdown().await;
    match &saved {
        Ok(()) => println!("Saved."),
        Err(e) => eprintln!("{} final save failed: {e}", "error:".red().bold()),
    }

    if interrupted {
        std::process::exit(if saved.is_ok() { 130 } else { 1 });
    }
    saved.context("final save failed")
}

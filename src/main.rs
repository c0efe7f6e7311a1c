use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use ensemble::config::Config;
use ensemble::console;
use ensemble::drafts::{DraftStore, FileStore};
use ensemble::entities::MockRepository;
use ensemble::flows::FlowKind;
use ensemble::logging;
use ensemble::wizard::{SessionOptions, WizardError, WizardPhase, WizardSession};

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(about = "Multi-step signup and band registration wizards")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available flows and their steps
    Flows,

    /// Fill in a flow interactively, or from a script of console commands
    Run {
        /// Flow to run (signup, new-band, edit-band)
        flow: FlowKind,

        /// Id of the entity to edit (edit-band)
        #[arg(short, long)]
        entity: Option<String>,

        /// Read commands from this file instead of stdin
        #[arg(short, long)]
        script: Option<PathBuf>,
    },

    /// Inspect or discard saved drafts
    Drafts {
        #[command(subcommand)]
        action: DraftsAction,
    },

    /// Show or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum DraftsAction {
    /// List saved drafts
    List,
    /// Print one draft as JSON
    Show {
        /// Entity key, e.g. band:new or band:banda-001
        entity_key: String,
    },
    /// Delete one draft
    Clear {
        /// Entity key, e.g. band:new or band:banda-001
        entity_key: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Write the default configuration to the user config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    // Only a session typed at the terminal can log to a file
    let interactive = matches!(cli.command, Commands::Run { script: None, .. });
    let logging_handle = logging::init_logging(&config, interactive, cli.debug)?;

    match cli.command {
        Commands::Flows => cmd_flows(),
        Commands::Run {
            flow,
            entity,
            script,
        } => {
            cmd_run(&config, flow, entity, script).await?;
        }
        Commands::Drafts { action } => cmd_drafts(&config, action)?,
        Commands::Config { action } => cmd_config(&config, action)?,
    }

    // Print log file path on exit if logs were written
    if let Some(log_path) = logging_handle.log_file_path {
        if let Ok(metadata) = log_path.metadata() {
            if metadata.len() > 0 {
                eprintln!("Session log: {}", log_path.display());
            }
        }
    }

    Ok(())
}

fn open_drafts(config: &Config) -> Result<DraftStore> {
    let store = FileStore::open(config.drafts_path()).context("Failed to open drafts directory")?;
    Ok(DraftStore::new(Arc::new(store)))
}

fn cmd_flows() {
    for kind in FlowKind::all() {
        let entity = kind.requires_entity().then_some("<id>");
        let Ok(flow) = kind.build(entity) else {
            continue;
        };

        println!("{} - {}", kind, kind.description());
        for step in &flow.steps {
            if step.applicability.is_always() {
                println!("  {}. {}", step.id, step.label);
            } else {
                println!("  {}. {} ({})", step.id, step.label, step.applicability);
            }
        }
        println!();
    }
}

async fn cmd_run(
    config: &Config,
    kind: FlowKind,
    entity: Option<String>,
    script: Option<PathBuf>,
) -> Result<()> {
    let flow = kind.build(entity.as_deref())?;
    let drafts = open_drafts(config)?;
    let repository = Arc::new(MockRepository::from_config(&config.mock));
    let options = SessionOptions::from_config(&config.submission);

    let mut session = match WizardSession::mount(flow, drafts, repository, options).await {
        Ok(session) => session,
        Err(err @ WizardError::EntityNotFound { .. }) => {
            eprintln!("Error: {}", err.user_message());
            if config.mock.seed_fixtures {
                eprintln!("Sample bands: banda-001, banda-002");
            }
            std::process::exit(1);
        }
        Err(err) => return Err(err.into()),
    };

    let mut stdout = io::stdout();
    let phase = match script {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open script {}", path.display()))?;
            console::run_lines(&mut session, BufReader::new(file), &mut stdout, true).await?
        }
        None => {
            println!("{}", console::HELP);
            println!();
            console::run_lines(&mut session, io::stdin().lock(), &mut stdout, false).await?
        }
    };

    if let WizardPhase::Editing(_) = phase {
        println!("Progress saved as draft for {}", session.entity_key());
    }
    Ok(())
}

fn cmd_drafts(config: &Config, action: DraftsAction) -> Result<()> {
    let drafts = open_drafts(config)?;

    match action {
        DraftsAction::List => {
            let all = drafts.list()?;
            if all.is_empty() {
                println!("No saved drafts");
                return Ok(());
            }

            println!("Saved Drafts ({})", all.len());
            println!("{}", "─".repeat(60));
            for draft in &all {
                let saved_at = chrono::DateTime::from_timestamp_millis(draft.saved_at_epoch_millis)
                    .map_or_else(|| "?".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
                let completed: Vec<String> = draft
                    .completed_step_ids
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!(
                    "{:<24} {} fields, steps done [{}], saved {}",
                    draft.entity_key,
                    draft.field_values.len(),
                    completed.join(", "),
                    saved_at
                );
            }
        }
        DraftsAction::Show { entity_key } => match drafts.load(&entity_key) {
            Some(draft) => println!("{}", serde_json::to_string_pretty(&draft)?),
            None => println!("No draft for {}", entity_key),
        },
        DraftsAction::Clear { entity_key } => {
            drafts.clear(&entity_key)?;
            println!("Cleared draft for {}", entity_key);
        }
    }

    Ok(())
}

fn cmd_config(config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str =
                toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;
            println!("{}", toml_str);
        }
        ConfigAction::Init { force } => {
            let path = Config::user_config_path().context("No config directory on this platform")?;
            if path.exists() && !force {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    path.display()
                );
                return Ok(());
            }
            let path = Config::default().save()?;
            println!("Wrote default config to {}", path.display());
        }
    }
    Ok(())
}

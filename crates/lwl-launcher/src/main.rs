use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use lwl_core::{GameEntry, RunEvent, VERSION};
use lwl_launcher::{logging, Config, ConfigSource, Launcher};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

/// LWL - launcher for locally installed games
#[derive(Parser, Debug)]
#[command(name = "lwl")]
#[command(version = VERSION)]
#[command(about = "LWL - game library launcher", long_about = None)]
struct Cli {
    /// Path to configuration file (default: ~/.config/lwl/config.toml)
    #[arg(short, long, env = "LWL_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered games
    List {
        /// Print the library as JSON
        #[arg(long)]
        json: bool,
    },

    /// Register an executable as a game
    Add {
        /// Path to the game executable
        path: PathBuf,

        /// Display name (default: executable name up to the first dot)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Remove a game from the library
    Remove {
        /// Game id, name or record file name
        game: String,
    },

    /// Launch a game and wait until it exits (Ctrl+C stops the game)
    Play {
        /// Game id, name or record file name
        game: String,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let (config, source) = Config::load_or_create(&config_path)?;

    config
        .validate()
        .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;
    config.ensure_directories()?;

    let _guard = logging::init_logging(&config.logs_location)?;

    info!("LWL v{} starting...", VERSION);
    match source {
        ConfigSource::Loaded => info!("Using config: {:?}", config_path),
        ConfigSource::Created => info!(
            "Config not found, created new config at: {:?}",
            config_path
        ),
    }

    let launcher = Launcher::from_config(&config).context("Failed to open game library")?;

    let result = match cli.command {
        Some(Commands::List { json }) => list_games(&launcher, json).await,
        Some(Commands::Add { path, name }) => add_game(&launcher, path, name),
        Some(Commands::Remove { game }) => remove_game(&launcher, &game).await,
        Some(Commands::Play { game }) => play_game(&launcher, &game).await,
        Some(Commands::GenerateConfig { output }) => generate_config(output),
        None => list_games(&launcher, false).await,
    };

    launcher.shutdown().await;
    result
}

/// Print the library with run state
async fn list_games(launcher: &Launcher, json: bool) -> Result<()> {
    let (games, skipped) = launcher.scan_games().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&games)?);
        return Ok(());
    }

    println!("{}", "=== LWL Library ===".green().bold());

    if games.is_empty() {
        println!("\n{}", "No games registered yet, add one with `lwl add <path>`".yellow());
    }

    for game in &games {
        let status = if game.is_running() {
            "▶ RUNNING".green()
        } else {
            "■".normal()
        };
        println!(
            "  {} {} - {}",
            status,
            game.entry.name.bold(),
            game.entry.path.display()
        );
        println!("      id: {}", game.entry.id.as_str().dimmed());
    }

    for skipped in &skipped {
        println!(
            "{}",
            format!("⚠️  Skipped {}: {}", skipped.path.display(), skipped.error).yellow()
        );
    }

    println!();
    Ok(())
}

fn add_game(launcher: &Launcher, path: PathBuf, name: Option<String>) -> Result<()> {
    let path = if path.is_relative() {
        std::env::current_dir()?.join(path)
    } else {
        path
    };

    let entry = launcher.add_game(name, path)?;

    println!(
        "{}",
        format!("✅ Added \"{}\" ({})", entry.name, entry.library_name).green()
    );
    Ok(())
}

async fn remove_game(launcher: &Launcher, query: &str) -> Result<()> {
    let entry = find_game(launcher, query)?;

    launcher.remove_game(&entry).await?;

    println!("{}", format!("🗑  Removed \"{}\"", entry.name).green());
    Ok(())
}

/// Launch a game and block until its process exits
async fn play_game(launcher: &Launcher, query: &str) -> Result<()> {
    let entry = find_game(launcher, query)?;
    let mut events = launcher.subscribe();

    let state = match launcher.launch(&entry).await {
        Ok(state) => state,
        Err(e) => {
            println!("{}", format!("❌ {}", e).red());
            return Err(e.into());
        }
    };

    println!(
        "{}",
        format!("▶ Playing \"{}\" (PID {})", entry.name, state.process_id).green()
    );
    println!("Press Ctrl+C to stop the game, twice to force it...\n");

    let mut interrupts = 0u32;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(RunEvent::Exited { id, exit_code, .. }) if id == entry.id => {
                    let code = exit_code.map_or("signal".to_string(), |c| c.to_string());
                    println!("{}", format!("■ \"{}\" exited ({})", entry.name, code).cyan());
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} run events", skipped),
                Err(RecvError::Closed) => {
                    error!("Run event channel closed while \"{}\" was running", entry.name);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c(), if interrupts < 2 => {
                interrupts += 1;
                if interrupts == 1 {
                    println!("{}", format!("Stopping \"{}\"...", entry.name).yellow());
                    launcher.stop(&entry).await;
                } else {
                    println!("{}", format!("Killing \"{}\"...", entry.name).red());
                    launcher.kill(&entry).await;
                }
            }
        }
    }

    Ok(())
}

/// Generate default configuration file
fn generate_config(output: PathBuf) -> Result<()> {
    info!("Generating default configuration file: {:?}", output);

    Config::default().save_to_file(&output)?;

    info!("Configuration file generated successfully");
    Ok(())
}

fn find_game(launcher: &Launcher, query: &str) -> Result<GameEntry> {
    launcher
        .find(query)?
        .ok_or_else(|| anyhow!("Game not found: {}", query))
}

//! pixel-bridge CLI
//!
//! Runs Rhai scripts against a simulated LED strip through the `PIXELS` API.
//!
//! ```text
//! pixel-bridge run demos/rainbow.rhai --leds 12
//! pixel-bridge run demos/rainbow.rhai --json
//! pixel-bridge check demos/rainbow.rhai
//! pixel-bridge version
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use pixel_bridge::config::BridgeConfig;
use pixel_bridge::{telemetry, DeviceHost, RhaiRuntime, RuntimeModule};

#[derive(Parser, Debug)]
#[command(name = "pixel-bridge")]
#[command(about = "Run scripts against a simulated LED strip", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a script and print the resulting strip state
    Run {
        /// Path to the .rhai script
        script: PathBuf,

        /// Configuration file (default: config/pixel_bridge.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Override the board's LED count
        #[arg(long, value_name = "N")]
        leds: Option<usize>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check script syntax without executing it
    Check {
        /// Path to the .rhai script
        script: PathBuf,
    },
    /// Show crate and runtime versions
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            script,
            config,
            leds,
            json,
        } => run(&script, config.as_deref(), leds, json),
        Commands::Check { script } => check(&script),
        Commands::Version => {
            println!("pixel-bridge {}", env!("CARGO_PKG_VERSION"));
            println!("runtime {}", RhaiRuntime::new().version());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>, leds: Option<usize>) -> Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::load_from(path),
        None => BridgeConfig::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(leds) = leds {
        config.board.max_leds = leds;
        config.validate().context("Invalid --leds value")?;
    }
    Ok(config)
}

fn read_script(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read script {}", path.display()))
}

fn run(script: &Path, config: Option<&Path>, leds: Option<usize>, json: bool) -> Result<()> {
    let config = load_config(config, leds)?;
    telemetry::init_from_config(&config);

    let source = read_script(script)?;
    let runtime = RhaiRuntime::from_config(&config.runtime);
    let mut host = DeviceHost::new(runtime, config.board.clone());
    host.initialize().context("Failed to initialize PIXELS API")?;
    info!(script = %script.display(), board = %config.board.name, "Running script");

    let outcome = host.runtime().run_script(&source);
    let snapshot = host.strip().snapshot();
    let flushes = host.strip().flush_count();
    let report = host.cleanup();
    info!(%report, "Released native functions");

    let outcome = outcome.with_context(|| format!("Script {} failed", script.display()))?;

    if json {
        let doc = json!({
            "board": config.board.name,
            "result": format!("{:?}", outcome.value),
            "output": outcome.output,
            "flushes": flushes,
            "leds": snapshot,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for line in &outcome.output {
            println!("{}", line);
        }
        println!("Result: {:?}", outcome.value);
        println!("Board {} ({} LEDs, {} updates)", config.board.name, snapshot.len(), flushes);
        for (index, color) in snapshot.iter().enumerate() {
            if *color != pixel_bridge::Rgb::BLACK {
                println!("  [{:>3}] {}", index, color);
            }
        }
    }
    Ok(())
}

fn check(script: &Path) -> Result<()> {
    let source = read_script(script)?;
    RhaiRuntime::new()
        .validate_script(&source)
        .with_context(|| format!("Syntax error in {}", script.display()))?;
    println!("{}: OK", script.display());
    Ok(())
}

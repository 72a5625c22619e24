use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fardel_rs::compiler::Compiler;
use fardel_rs::config::{Config, Mode, RawConfig};
use fardel_rs::watch::Watcher;

/// fardel: builds web-asset bundles from a typed fardel.json configuration
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// Path to the configuration file, relative to the project root
    #[clap(short, long, global = true, default_value = "fardel.json")]
    config: PathBuf,

    /// Build mode: dev or prod. Falls back to the FARDEL_ENV variable
    #[clap(short, long, global = true)]
    mode: Option<String>,

    /// Project root directory
    #[clap(short, long, global = true, default_value = ".")]
    project_root: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every bundle once
    Build,
    /// Build, then rebuild affected bundles on file change (development)
    Watch,
    /// Print the resolved configuration as JSON
    Inspect,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mode = match &args.mode {
        Some(mode) => Mode::from_str(mode)?,
        None => Mode::from_env(),
    };
    // Watch mode only makes sense against a development configuration
    let mode = match args.command {
        Command::Watch => Mode::Development,
        _ => mode,
    };

    let config_path = args.project_root.join(&args.config);
    let raw = RawConfig::from_file(&config_path)?;
    let config = Config::resolve(&raw, mode, &args.project_root)
        .with_context(|| format!("invalid configuration '{}'", config_path.display()))?;

    match args.command {
        Command::Build => {
            let report = Compiler::new(config).build()?;
            for asset in &report.assets {
                println!("{}  {} bytes", asset.public_url, asset.size);
            }
            println!(
                "built {} asset(s) from {} module(s) in {} mode",
                report.assets.len(),
                report.module_count,
                mode
            );
        }
        Command::Watch => {
            Watcher::new(Compiler::new(config)).run()?;
        }
        Command::Inspect => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

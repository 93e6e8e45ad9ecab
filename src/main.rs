mod commands;
mod config;
mod constants;
mod jail;
mod meta;
mod pillar;
mod remote;
mod resolver;
mod shell;
mod sweep;
mod ui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Instant;

use commands::{DeployOpts, RestartOpts};
use config::Config;
use constants::DEFAULT_CONFIG;

#[derive(Parser)]
#[command(
    name = "jroll",
    version,
    about = "Blue/green deployment of ZFS-backed FreeBSD jails",
    infer_subcommands = true
)]
struct Cli {
    /// Path to the configuration file (default: ../etc/jroll.yml next
    /// to the executable)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll the inactive group of each project forward to its super's state
    Deploy {
        /// Deploy into this group instead of the resolved inactive one
        #[arg(short, long)]
        group: Option<String>,

        /// Discover and plan only; change nothing on any host
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Remove excess managed snapshots on every target
        #[arg(short = 'w', long, conflicts_with = "no_sweep")]
        sweep: bool,

        /// Keep every snapshot, even past the automatic threshold
        #[arg(short = 'W', long)]
        no_sweep: bool,

        /// Projects to deploy
        #[arg(required = true)]
        projects: Vec<String>,
    },
    /// Stop and start a group, refreshing copied files and meta data
    Restart {
        /// Act on the active group instead of the inactive one
        #[arg(short, long)]
        active: bool,

        /// Act on this group, overriding resolution
        #[arg(short, long)]
        group: Option<String>,

        /// Discover only; change nothing on any host
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Projects to restart
        #[arg(required = true)]
        projects: Vec<String>,
    },
    /// List projects, their groups and member states
    Show {
        /// Projects to show (all when omitted)
        projects: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            ui::print_error(&format!("cannot load configuration: {:#}", e));
            std::process::exit(1);
        }
    };

    let started = Instant::now();
    match &cli.command {
        Commands::Deploy {
            group,
            dry_run,
            sweep,
            no_sweep,
            projects,
        } => {
            let opts = DeployOpts {
                group: group.clone(),
                dry_run: *dry_run,
                sweep: *sweep,
                no_sweep: *no_sweep,
            };
            commands::deploy(&config, projects, &opts)?;
        }
        Commands::Restart {
            active,
            group,
            dry_run,
            projects,
        } => {
            let opts = RestartOpts {
                active: *active,
                dry_run: *dry_run,
                group: group.clone(),
            };
            commands::restart(&config, projects, &opts)?;
        }
        Commands::Show { projects } => commands::show(&config, projects)?,
    }
    log::info!("elapsed {} seconds", started.elapsed().as_secs());

    Ok(())
}

/// The stock installation keeps its config next to the binary's prefix.
fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

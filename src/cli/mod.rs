pub mod bedtime;
pub mod limits;
pub mod manifest;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use bedtime::{process_bedtime_command, BedtimeCommand};
use clap::{Parser, Subcommand, ValueEnum};
use limits::{process_limit_command, LimitCommand};
use manifest::{process_manifest_command, ManifestCommand};
use status::process_status_command;
use tracing::level_filters::LevelFilter;

use crate::{
    settings::{
        file_store::FileSettingsStore,
        store::{SettingsStore, SettingsStoreExt},
    },
    utils::{
        dir::{application_path, settings_path},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Prodi", version, long_about = None)]
#[command(about = "Daily and monthly time limits for websites, plus a bedtime mode", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(
        long,
        global = true,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Enable logging")]
    log: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResetPeriod {
    Daily,
    Monthly,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show usage against limits and the bedtime state")]
    Status {
        #[arg(long, help = "Only show this domain")]
        domain: Option<String>,
    },
    #[command(about = "Manage time limits")]
    Limit {
        #[command(subcommand)]
        command: LimitCommand,
    },
    #[command(about = "Show or change bedtime mode")]
    Bedtime {
        #[command(flatten)]
        command: BedtimeCommand,
    },
    #[command(about = "Reset usage counters now")]
    Reset { period: ResetPeriod },
    #[command(about = "Print the native messaging manifest for the host")]
    Manifest {
        #[command(flatten)]
        command: ManifestCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = application_path(args.dir)?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    let store = FileSettingsStore::new(settings_path(&app_dir))?;
    match args.commands {
        Commands::Status { domain } => process_status_command(domain, &store).await,
        Commands::Limit { command } => process_limit_command(command, &store).await,
        Commands::Bedtime { command } => process_bedtime_command(command, &store)
            .await
            .map(|_| ()),
        Commands::Reset { period } => process_reset_command(period, &store).await,
        Commands::Manifest { command } => process_manifest_command(command),
    }
}

async fn process_reset_command(period: ResetPeriod, store: &impl SettingsStore) -> Result<()> {
    match period {
        ResetPeriod::Daily => {
            store.reset_daily().await?;
            println!("Daily usage reset");
        }
        ResetPeriod::Monthly => {
            store.reset_monthly().await?;
            println!("Monthly usage reset");
        }
    }
    Ok(())
}

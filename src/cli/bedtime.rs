use anyhow::Result;
use chrono::Local;
use clap::{CommandFactory, Parser};

use crate::{
    bedtime::{is_bedtime_active, parse_time_of_day},
    settings::{
        entities::{BedtimePatch, BedtimeSettings},
        store::{SettingsStore, SettingsStoreExt},
    },
};

use super::Args;

#[derive(Debug, Parser)]
pub struct BedtimeCommand {
    #[arg(long, conflicts_with_all = ["disable", "toggle"], help = "Turn bedtime mode on")]
    enable: bool,
    #[arg(long, conflicts_with = "toggle", help = "Turn bedtime mode off")]
    disable: bool,
    #[arg(long, help = "Flip bedtime mode")]
    toggle: bool,
    #[arg(long, help = "Start of the window, HH:MM")]
    start: Option<String>,
    #[arg(long, help = "End of the window, HH:MM. An end before the start wraps over midnight")]
    end: Option<String>,
}

/// Validates a time of day and brings it to `HH:MM`.
fn canonical_time(value: Option<String>) -> Result<Option<String>> {
    value
        .map(|v| {
            parse_time_of_day(&v)
                .map(|time| time.format("%H:%M").to_string())
                .map_err(|e| {
                    Args::command()
                        .error(clap::error::ErrorKind::ValueValidation, format!("{e:#}"))
                        .into()
                })
        })
        .transpose()
}

/// Applies the requested changes. Without any flags only shows the current state.
pub async fn process_bedtime_command(
    BedtimeCommand {
        enable,
        disable,
        toggle,
        start,
        end,
    }: BedtimeCommand,
    store: &impl SettingsStore,
) -> Result<BedtimeSettings> {
    let patch = BedtimePatch {
        enabled: match (enable, disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        },
        start_time: canonical_time(start)?,
        end_time: canonical_time(end)?,
    };

    let bedtime = match (patch.is_empty(), toggle) {
        (true, false) => store.bedtime().await?,
        (true, true) => store.toggle_bedtime().await?,
        (false, false) => store.set_bedtime(patch).await?,
        (false, true) => {
            store.set_bedtime(patch).await?;
            store.toggle_bedtime().await?
        }
    };

    let state = if bedtime.enabled { "on" } else { "off" };
    println!(
        "Bedtime mode {state}, {} to {}",
        bedtime.start_time, bedtime.end_time
    );
    if is_bedtime_active(Local::now().time(), &bedtime)? {
        println!("Grayscale is active now");
    }
    Ok(bedtime)
}

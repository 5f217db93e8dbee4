use anyhow::Result;
use clap::{CommandFactory, Subcommand};
use tracing::info;

use crate::{
    settings::{
        entities::TimeLimit,
        store::{SettingsStore, SettingsStoreExt},
    },
    tabs::resolve_domain,
};

use super::{status::format_minutes, Args};

const DEFAULT_DAILY_MINUTES: f64 = 30.;
const DEFAULT_MONTHLY_MINUTES: f64 = 300.;

#[derive(Subcommand, Debug)]
pub enum LimitCommand {
    #[command(about = "Add a limit for a domain, replacing the existing one")]
    Add {
        #[arg(help = "Domain to limit, e.g. x.com. A full url is reduced to its hostname")]
        domain: String,
        #[arg(long, default_value_t = DEFAULT_DAILY_MINUTES, help = "Minutes allowed per day")]
        daily: f64,
        #[arg(long, default_value_t = DEFAULT_MONTHLY_MINUTES, help = "Minutes allowed per month")]
        monthly: f64,
    },
    #[command(about = "Remove the limit of a domain. Collected usage is kept")]
    Remove { domain: String },
    #[command(about = "List configured limits")]
    List,
}

fn validation_error(message: String) -> anyhow::Error {
    Args::command()
        .error(clap::error::ErrorKind::ValueValidation, message)
        .into()
}

/// Hostname of `input`, which may be a bare domain, a domain with a path or port, or a url. The
/// result is what tab urls resolve to, so limits match the tabs they are meant for.
fn normalize_domain(input: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(validation_error("Domain can't be empty".into()));
    }
    let url = if input.contains("://") {
        input.to_owned()
    } else {
        format!("https://{input}")
    };
    resolve_domain(&url)
        .filter(|v| !v.is_empty())
        .map(|v| v.to_lowercase())
        .ok_or_else(|| validation_error(format!("{input} doesn't have a hostname")))
}

fn validate_minutes(name: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0. {
        Ok(value)
    } else {
        Err(validation_error(format!(
            "{name} limit should be a non negative number of minutes, got {value}"
        )))
    }
}

pub async fn process_limit_command(
    command: LimitCommand,
    store: &impl SettingsStore,
) -> Result<()> {
    match command {
        LimitCommand::Add {
            domain,
            daily,
            monthly,
        } => {
            let limit = TimeLimit::new(
                normalize_domain(&domain)?,
                validate_minutes("Daily", daily)?,
                validate_minutes("Monthly", monthly)?,
            );
            info!("Saving limit {limit:?}");
            println!("{}", describe_limit(&limit));
            store.upsert_time_limit(limit).await?;
        }
        LimitCommand::Remove { domain } => {
            let domain = normalize_domain(&domain)?;
            if store.remove_time_limit(&domain).await? {
                println!("Removed limit for {domain}");
            } else {
                println!("No limit for {domain}");
            }
        }
        LimitCommand::List => {
            let limits = store.time_limits().await?;
            if limits.is_empty() {
                println!("No limits configured");
            }
            for limit in limits {
                println!("{}", describe_limit(&limit));
            }
        }
    }
    Ok(())
}

fn describe_limit(limit: &TimeLimit) -> String {
    format!(
        "{}\tdaily {}\tmonthly {}",
        limit.domain,
        format_minutes(limit.minutes_per_day),
        format_minutes(limit.minutes_per_month)
    )
}

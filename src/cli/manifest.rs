use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;

/// Name the extension connects to.
pub const HOST_NAME: &str = "com.prodi.host";

#[derive(Debug, Parser)]
pub struct ManifestCommand {
    #[arg(long, help = "Id of the installed extension")]
    extension_id: String,
    #[arg(
        long,
        help = "Path of the host executable. By default prodi-host next to this executable"
    )]
    host_path: Option<PathBuf>,
}

/// Native messaging host manifest, as browsers expect it in their `NativeMessagingHosts`
/// directory.
#[derive(Debug, Serialize)]
pub struct HostManifest {
    pub name: &'static str,
    pub description: &'static str,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub allowed_origins: Vec<String>,
}

impl HostManifest {
    pub fn new(extension_id: &str, path: PathBuf) -> Self {
        Self {
            name: HOST_NAME,
            description: "Prodi time limits and bedtime mode",
            path,
            kind: "stdio",
            allowed_origins: vec![format!("chrome-extension://{}/", extension_id.trim())],
        }
    }
}

fn default_host_path() -> Result<PathBuf> {
    let current = std::env::current_exe().context("Failed to locate current executable")?;
    Ok(current.with_file_name(format!("prodi-host{}", std::env::consts::EXE_SUFFIX)))
}

pub fn process_manifest_command(
    ManifestCommand {
        extension_id,
        host_path,
    }: ManifestCommand,
) -> Result<()> {
    let path = match host_path {
        Some(path) => path,
        None => default_host_path()?,
    };
    let manifest = HostManifest::new(&extension_id, path);
    println!("{}", serde_json::to_string_pretty(&manifest)?);
    Ok(())
}

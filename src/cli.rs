use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;

/// Resolve an app by id, store URL or name and install its plugin archive.
///
/// With no query, queries are read line by line from stdin.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// App ID, store URL or name. Multiple words are joined with spaces.
    pub query: Vec<String>,

    /// Settings file (defaults to the per-user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL serving `{id}.zip` archives
    #[arg(long)]
    pub archive_base: Option<String>,

    /// Installation root; skips probing
    #[arg(long)]
    pub install_root: Option<PathBuf>,

    /// Directory for temporary downloads
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Do not restart the host application after installing
    #[arg(long)]
    pub no_restart: bool,

    /// Do not ask for administrator rights
    #[arg(long)]
    pub no_elevate: bool,
}

impl Cli {
    /// Command-line flags win over the settings file.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(base) = &self.archive_base {
            settings.archive_base_url = Some(base.clone());
        }
        if let Some(root) = &self.install_root {
            settings.install_root = Some(root.clone());
        }
        if let Some(dir) = &self.staging_dir {
            settings.staging_dir = Some(dir.clone());
        }
        if self.no_restart {
            settings.restart_services = false;
        }
    }

    pub fn joined_query(&self) -> Option<String> {
        let q = self.query.join(" ");
        let q = q.trim();
        (!q.is_empty()).then(|| q.to_string())
    }
}

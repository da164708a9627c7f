//! Locating and reading `relay.config.ron`

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::controller::Relay;

pub const CONFIG_FILE_NAME: &str = "relay.config.ron";

/// Directories searched, in order, when no path is given
pub const SEARCH_DIRS: [&str; 2] = [".", "/etc/relay"];

/// Where the configuration was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or through `RELAY_CONFIG`
    Explicit(PathBuf),
    /// First match in the search directories
    Discovered(PathBuf),
}

impl ConfigSource {
    /// Pick the configuration file.
    ///
    /// An explicit path must exist; it is never silently replaced by a
    /// discovered one.
    pub fn resolve<D: AsRef<Path>>(explicit: Option<PathBuf>, search: &[D]) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            anyhow::ensure!(
                path.is_file(),
                "Configuration file {} does not exist",
                path.display()
            );
            return Ok(Self::Explicit(path));
        }

        let candidates: Vec<PathBuf> = search
            .iter()
            .map(|dir| dir.as_ref().join(CONFIG_FILE_NAME))
            .collect();

        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .map(Self::Discovered)
            .ok_or_else(|| {
                let tried = candidates
                    .iter()
                    .map(|p| format!("  - {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n");
                anyhow::anyhow!(
                    "No configuration file found. Pass --config, set RELAY_CONFIG, or create one of:\n{tried}"
                )
            })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(path) | Self::Discovered(path) => path,
        }
    }

    /// Read and parse the file.
    pub fn load(&self) -> anyhow::Result<Relay> {
        let path = self.path();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Context as _;
use serde::Deserialize;

use crate::engine::OutputMode;

/// File looked up in the working directory when no `--config` is given.
pub const CONFIG_FILE_NAME: &str = "flagprune.toml";

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FlagpruneConfig {
    /// Output mode used when none is given on the command line
    #[serde(default)]
    pub output: Option<OutputMode>,

    /// Variable name -> the flag key it holds
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Globs selecting the files found in directories
    #[serde(default)]
    pub include: Vec<String>,

    /// Globs of files found in directories to leave alone
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl FlagpruneConfig {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let config: FlagpruneConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Load `explicit` if given, which must exist. Otherwise load
    /// `flagprune.toml` from `dir` when there is one.
    pub fn load(explicit: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = dir.join(CONFIG_FILE_NAME);
                if !path.is_file() {
                    return Ok(Self::default());
                }
                path
            }
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// The aliases holding `key`. Aliases of other flags are left out.
    pub fn aliases_for(&self, key: &str) -> BTreeSet<String> {
        self.aliases
            .iter()
            .filter(|(_, flag_key)| *flag_key == key)
            .map(|(alias, _)| alias.clone())
            .collect()
    }
}

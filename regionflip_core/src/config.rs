use crate::mutator::SelectionMode;
use crate::scheduler::RegionSelection;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MutationSettings {
    #[serde(default = "default_bit_count")]
    pub bit_count: usize,
    #[serde(default)]
    pub mode: SelectionMode,
    #[serde(default)]
    pub selection: RegionSelection,
    /// Region name used when `selection = "fixed"`.
    pub region: Option<String>,
    /// Seed for the corruption RNG; a random one is drawn (and logged) when absent.
    pub seed: Option<u64>,
}

pub fn default_bit_count() -> usize {
    3
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            bit_count: default_bit_count(),
            mode: SelectionMode::default(),
            selection: RegionSelection::default(),
            region: None,
            seed: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    #[serde(default = "default_iterations")]
    pub iterations: u64,
}

pub fn default_iterations() -> u64 {
    1
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default)]
    pub save: bool,
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Skip persisting mutations the decodability oracle rejects.
    #[serde(default)]
    pub skip_undecodable: bool,
}

pub fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            save: false,
            dir: default_output_dir(),
            skip_undecodable: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RegionflipConfig {
    #[serde(default)]
    pub mutation: MutationSettings,
    #[serde(default)]
    pub run: RunSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl RegionflipConfig {
    /// Name of the config file picked up from the working directory.
    pub const DEFAULT_FILE_NAME: &'static str = "regionflip.toml";

    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        Self::from_toml_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, anyhow::Error> {
        let config: RegionflipConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings no run could satisfy.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.mutation.bit_count == 0 {
            anyhow::bail!("mutation.bit-count must be at least 1");
        }
        if self.mutation.selection == RegionSelection::Fixed && self.mutation.region.is_none() {
            anyhow::bail!("mutation.selection = \"fixed\" requires mutation.region");
        }
        Ok(())
    }
}

//! Run configuration.
//!
//! Sources are merged in this order, later overriding earlier:
//! 1. `WeaveConfig::default()`
//! 2. a TOML file (`knit.toml` in the working directory unless given)
//! 3. `KNIT_*` environment variables, `__` separating nested keys
//!    (e.g. `KNIT_MARKERS__INJECT`)
//! 4. command-line flags

use crate::domain::builder::Markers;
use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILENAME: &str = "knit.toml";
pub const ENV_PREFIX: &str = "KNIT_";

/// Binary layout of input and output class entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClassFormat {
    /// JVM class files
    #[default]
    Jvm,
    /// KCLS images: a smaller JVM-shaped format for hand-written fixtures
    Kcls,
}

impl ClassFormat {
    /// Format of an entry, judged by its first four bytes.
    pub fn detect(bytes: &[u8]) -> Option<ClassFormat> {
        match bytes.get(..4)? {
            [0xca, 0xfe, 0xba, 0xbe] => Some(ClassFormat::Jvm),
            b"KCLS" => Some(ClassFormat::Kcls),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Program input directories, scanned in order
    pub inputs: Vec<PathBuf>,
    /// Classpath-only directories
    pub libraries: Vec<PathBuf>,
    pub output: PathBuf,
    /// Graph dump destination
    pub dump: Option<PathBuf>,
    /// Change feed destination; needs `previous_dump` to report additions and removals
    pub change_feed: Option<PathBuf>,
    pub previous_dump: Option<PathBuf>,
    /// Worker threads for transform and encode; rayon's default when unset
    pub threads: Option<usize>,
    /// Class entry format, the same for inputs and output
    pub format: ClassFormat,
    pub markers: Markers,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            libraries: Vec::new(),
            output: PathBuf::from("knit-out"),
            dump: None,
            change_feed: None,
            previous_dump: None,
            threads: None,
            format: ClassFormat::Jvm,
            markers: Markers::default(),
        }
    }
}

impl WeaveConfig {
    fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            anyhow::bail!("No input directories configured");
        }
        if self.threads == Some(0) {
            anyhow::bail!("threads must be at least 1");
        }
        if self.inputs.iter().any(|input| input == &self.output) {
            anyhow::bail!("Output directory {} is also an input", self.output.display());
        }
        Ok(())
    }
}

/// Command-line values; unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaveOverrides {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_feed: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_dump: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ClassFormat>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn figment(&self, overrides: &WeaveOverrides) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(WeaveConfig::default()));

        let file = self
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
        if file.exists() {
            tracing::debug!(path = %file.display(), "loading config file");
            figment = figment.merge(Toml::file(&file));
        } else if self.config_path.is_some() {
            tracing::warn!(path = %file.display(), "config file not found");
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
    }

    pub fn load(&self, overrides: &WeaveOverrides) -> Result<WeaveConfig> {
        let config: WeaveConfig = self
            .figment(overrides)
            .extract()
            .context("Failed to extract configuration")?;
        config.validate()?;
        Ok(config)
    }
}

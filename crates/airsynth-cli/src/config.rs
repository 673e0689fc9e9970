use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use airsynth_generate::producers::{ComplementShape, FlightTimetable};
use airsynth_generate::{FleetPlan, PipelineSettings, SynthesisOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("config already exists at {0}")]
    Exists(PathBuf),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    #[default]
    Csv,
    Postgres,
}

impl SinkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkKind::Csv => "csv",
            SinkKind::Postgres => "postgres",
        }
    }
}

/// Where generated rows go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent directory for run folders.
    pub run_dir: PathBuf,
    pub sink: SinkKind,
    pub database_url: Option<String>,
    /// Postgres schema holding the airline tables.
    pub schema: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from("runs"),
            sink: SinkKind::Csv,
            database_url: None,
            schema: "airline".to_string(),
        }
    }
}

/// Contents of `airsynth.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub seed: u64,
    pub output: OutputConfig,
    pub plan: FleetPlan,
    pub pipeline: PipelineSettings,
    pub timetable: FlightTimetable,
    pub complement: ComplementShape,
}

impl SynthConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Reads `path` when given, otherwise starts from defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path, overwrite: bool) -> ConfigResult<()> {
        if path.exists() && !overwrite {
            return Err(ConfigError::Exists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent)?;
        }
        let encoded = toml::to_string_pretty(self)?;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        file.write_all(encoded.as_bytes())?;
        Ok(())
    }

    pub fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            seed: self.seed,
            plan: self.plan.clone(),
            pipeline: self.pipeline.clone(),
            timetable: self.timetable.clone(),
            complement: self.complement,
        }
    }
}

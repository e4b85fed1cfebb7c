//! Run configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional YAML file, command-line flags.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::feedforward::{NewNetError, Topology, TrainParams};
use crate::report::DEFAULT_SEPARATOR;

/// Data file used when none is given.
pub const DEFAULT_DATA_FILE: &str = "BanknoteAuthenticationData.txt";

/// Name of the log file placed next to the data file when no output path is given.
pub const OUTPUT_FILE_NAME: &str = "BanknoteAuthenticationOutput.txt";

/// Immutable configuration of a training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hyperparameters {
    pub topology: Topology,
    /// Share of rows that go to the train set.
    pub train_fraction: f64,
    pub train: TrainParams,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            topology: Topology::default(),
            train_fraction: 0.8,
            train: TrainParams::default(),
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.train_fraction) {
            return Err(ConfigError::BadTrainFraction(self.train_fraction));
        }
        self.train.validate()
    }
}

/// Everything `crate::run` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub data_path: PathBuf,
    pub output_path: PathBuf,
    pub hyperparameters: Hyperparameters,
    /// Seed of the random generator; taken from the OS when absent.
    pub seed: Option<u64>,
    pub decimal_separator: char,
}

/// Log path for a data file: its directory joined with `OUTPUT_FILE_NAME`.
pub fn default_output_path(data_path: &Path) -> PathBuf {
    data_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(OUTPUT_FILE_NAME)
}

/// Partially defined configuration. Also defines the config file format
/// (every field can be omitted).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub input_nodes: Option<usize>,
    pub hidden_nodes: Option<usize>,
    pub output_nodes: Option<usize>,
    pub train_fraction: Option<f64>,
    pub epochs: Option<usize>,
    pub learn_rate: Option<f64>,
    pub momentum: Option<f64>,
    pub certainty: Option<f64>,
    pub seed: Option<u64>,
    pub decimal_separator: Option<char>,
}

impl FileConfig {
    /// Reads a YAML config file.
    pub fn load(path: &Path) -> Result<FileConfig> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| Error::ConfigFile {
            path: path.to_owned(),
            source,
        })
    }

    /// Merges configs where the second overwrites the first.
    pub fn merge(self, other: Self) -> Self {
        FileConfig {
            data: other.data.or(self.data),
            output: other.output.or(self.output),
            input_nodes: other.input_nodes.or(self.input_nodes),
            hidden_nodes: other.hidden_nodes.or(self.hidden_nodes),
            output_nodes: other.output_nodes.or(self.output_nodes),
            train_fraction: other.train_fraction.or(self.train_fraction),
            epochs: other.epochs.or(self.epochs),
            learn_rate: other.learn_rate.or(self.learn_rate),
            momentum: other.momentum.or(self.momentum),
            certainty: other.certainty.or(self.certainty),
            seed: other.seed.or(self.seed),
            decimal_separator: other.decimal_separator.or(self.decimal_separator),
        }
    }

    /// Fills the gaps with defaults and validates the result.
    pub fn into_run_config(self) -> std::result::Result<RunConfig, ConfigError> {
        let defaults = Hyperparameters::default();
        let topology = Topology::new(
            self.input_nodes.unwrap_or(defaults.topology.inputs()),
            self.hidden_nodes.unwrap_or(defaults.topology.hidden()),
            self.output_nodes.unwrap_or(defaults.topology.outputs()),
        )?;
        let hyperparameters = Hyperparameters {
            topology,
            train_fraction: self.train_fraction.unwrap_or(defaults.train_fraction),
            train: TrainParams {
                max_epochs: self.epochs.unwrap_or(defaults.train.max_epochs),
                learn_rate: self.learn_rate.unwrap_or(defaults.train.learn_rate),
                momentum: self.momentum.unwrap_or(defaults.train.momentum),
                certainty: self.certainty.unwrap_or(defaults.train.certainty),
            },
        };
        hyperparameters.validate()?;

        let decimal_separator = self.decimal_separator.unwrap_or(DEFAULT_SEPARATOR);
        if decimal_separator.is_ascii_digit()
            || decimal_separator.is_whitespace()
            || decimal_separator == '-'
        {
            return Err(ConfigError::BadDecimalSeparator(decimal_separator));
        }

        let data_path = self
            .data
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_FILE));
        let output_path = self
            .output
            .unwrap_or_else(|| default_output_path(&data_path));

        Ok(RunConfig {
            data_path,
            output_path,
            hyperparameters,
            seed: self.seed,
            decimal_separator,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Topology(#[from] NewNetError),
    #[error("train fraction must be within [0, 1], but got {0}")]
    BadTrainFraction(f64),
    #[error("at least one epoch is required")]
    ZeroEpochs,
    #[error("learn rate must be a non-negative number, but got {0}")]
    BadLearnRate(f64),
    #[error("momentum must be a non-negative number, but got {0}")]
    BadMomentum(f64),
    #[error("certainty must be a non-negative number, but got {0}")]
    BadCertainty(f64),
    #[error("{0:?} cannot be used as decimal separator")]
    BadDecimalSeparator(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FileConfig::default().into_run_config().unwrap();
        let h = config.hyperparameters;
        assert_eq!(h.topology, Topology::new(4, 5, 2).unwrap());
        assert_eq!(h.train_fraction, 0.8);
        assert_eq!(h.train.max_epochs, 1000);
        assert_eq!(h.train.learn_rate, 0.05);
        assert_eq!(h.train.momentum, 0.05);
        assert_eq!(h.train.certainty, 0.99);
        assert_eq!(config.decimal_separator, ',');
        assert_eq!(config.seed, None);
        assert_eq!(config.data_path, PathBuf::from(DEFAULT_DATA_FILE));
        assert_eq!(config.output_path, PathBuf::from(OUTPUT_FILE_NAME));
    }

    #[test]
    fn output_lands_next_to_data() {
        let config = FileConfig {
            data: Some(PathBuf::from("sets/banknotes.txt")),
            ..FileConfig::default()
        }
        .into_run_config()
        .unwrap();
        assert_eq!(
            config.output_path,
            Path::new("sets").join(OUTPUT_FILE_NAME)
        );
    }

    #[test]
    fn later_layer_wins() {
        let file = FileConfig {
            epochs: Some(10),
            momentum: Some(0.3),
            ..FileConfig::default()
        };
        let flags = FileConfig {
            epochs: Some(20),
            ..FileConfig::default()
        };
        let merged = file.merge(flags);
        assert_eq!(merged.epochs, Some(20));
        assert_eq!(merged.momentum, Some(0.3));
    }

    #[test]
    fn yaml_fields_are_optional() {
        let config: FileConfig =
            serde_yaml::from_str("hidden_nodes: 8\nlearn_rate: 0.1\nseed: 42\n").unwrap();
        assert_eq!(config.hidden_nodes, Some(8));
        assert_eq!(config.learn_rate, Some(0.1));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.epochs, None);
        assert!(serde_yaml::from_str::<FileConfig>("hiden_nodes: 8\n").is_err());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_hidden = FileConfig {
            hidden_nodes: Some(0),
            ..FileConfig::default()
        };
        assert!(matches!(
            zero_hidden.into_run_config(),
            Err(ConfigError::Topology(NewNetError::BadTopology { hidden: 0, .. }))
        ));

        let fraction = FileConfig {
            train_fraction: Some(1.5),
            ..FileConfig::default()
        };
        assert_eq!(
            fraction.into_run_config(),
            Err(ConfigError::BadTrainFraction(1.5))
        );

        let separator = FileConfig {
            decimal_separator: Some('7'),
            ..FileConfig::default()
        };
        assert_eq!(
            separator.into_run_config(),
            Err(ConfigError::BadDecimalSeparator('7'))
        );
    }
}

//! Crate-level error, wrapping the error of every stage.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::data::FormatError;
use crate::feedforward::{NewNetError, TrainError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("cannot write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("malformed config file {}: {source}", .path.display())]
    ConfigFile {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Net(#[from] NewNetError),

    #[error(transparent)]
    Train(#[from] TrainError),
}

pub type Result<T> = std::result::Result<T, Error>;

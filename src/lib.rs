//! Banknote authentication with a feedforward network.
//!
//! A network with one `tanh` hidden layer and a softmax output is trained by online
//! backpropagation with momentum to tell genuine banknotes from forged ones, given
//! four real-valued features per note.
//!
//! `run` is the whole pipeline: read the data file, split it into train and test sets,
//! train, and write the progress log next to the data.

pub mod config;
pub mod data;
pub mod error;
pub mod feedforward;
pub mod logging;
pub mod report;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use tracing::{debug, info};

use config::{Hyperparameters, RunConfig};
use data::Dataset;
use feedforward::Net;
use report::ProgressLog;

pub use error::{Error, Result};

/// Result of a finished run.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub net: Net,
    pub log: ProgressLog,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

/// Splits `dataset`, builds a randomly initialized network and trains it.
///
/// `rng` is used, in this order, for the partition, the initial coefficients
/// and the sample order.
pub fn train<R: Rng>(
    dataset: &Dataset,
    hyperparameters: &Hyperparameters,
    rng: &mut R,
) -> Result<Outcome> {
    hyperparameters.validate()?;

    let (train_set, test_set) = dataset.partition(hyperparameters.train_fraction, rng);
    info!(
        train = train_set.len(),
        test = test_set.len(),
        "dataset partitioned"
    );

    let topology = hyperparameters.topology;
    debug!(
        inputs = topology.inputs(),
        hidden = topology.hidden(),
        outputs = topology.outputs(),
        "building network"
    );
    let mut trainer = Net::new(topology, rng).build_trainer();
    let log = trainer.train(&train_set, &test_set, &hyperparameters.train, rng)?;
    let net = trainer.teardown();

    let certainty = hyperparameters.train.certainty;
    let train_accuracy = net
        .accuracy(&train_set, certainty)
        .map_err(feedforward::TrainError::from)?;
    let test_accuracy = net
        .accuracy(&test_set, certainty)
        .map_err(feedforward::TrainError::from)?;

    Ok(Outcome {
        net,
        log,
        train_accuracy,
        test_accuracy,
    })
}

/// Runs the whole pipeline described by `config`.
///
/// Any error aborts the run; the progress log is only written once training is complete.
pub fn run(config: &RunConfig) -> Result<Outcome> {
    config.hyperparameters.validate()?;

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let dataset = Dataset::read_file(&config.data_path)?;
    info!(
        rows = dataset.len(),
        path = %config.data_path.display(),
        "dataset loaded"
    );

    let outcome = train(&dataset, &config.hyperparameters, &mut rng)?;

    let write_error = |source| Error::Write {
        path: config.output_path.clone(),
        source,
    };
    let mut file = File::create(&config.output_path).map_err(write_error)?;
    outcome
        .log
        .write_to(&mut file, config.decimal_separator)
        .map_err(write_error)?;
    info!(
        path = %config.output_path.display(),
        checkpoints = outcome.log.len(),
        "progress log written"
    );

    Ok(outcome)
}

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info};

use super::net::{Activations, Net, ProcessError, SizeMismatch};
use crate::config::ConfigError;
use crate::data::{shuffled_indices, Dataset};
use crate::report::{ProgressLog, ProgressRecord};

/// Number of progress checkpoints taken over a full run.
pub const CHECKPOINTS: usize = 100;

/// Parameters of a single training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainParams {
    /// Number of full passes over the train set.
    pub max_epochs: usize,
    /// Multiplier of the gradient step.
    pub learn_rate: f64,
    /// Multiplier of the previous sample's step.
    pub momentum: f64,
    /// Minimal `|out0 - out1|` for a prediction to count as certain in `Net::accuracy`.
    pub certainty: f64,
}

impl Default for TrainParams {
    fn default() -> Self {
        TrainParams {
            max_epochs: 1000,
            learn_rate: 0.05,
            momentum: 0.05,
            certainty: 0.99,
        }
    }
}

impl TrainParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_epochs == 0 {
            return Err(ConfigError::ZeroEpochs);
        }
        if !self.learn_rate.is_finite() || self.learn_rate < 0.0 {
            return Err(ConfigError::BadLearnRate(self.learn_rate));
        }
        if !self.momentum.is_finite() || self.momentum < 0.0 {
            return Err(ConfigError::BadMomentum(self.momentum));
        }
        if !self.certainty.is_finite() || self.certainty < 0.0 {
            return Err(ConfigError::BadCertainty(self.certainty));
        }
        Ok(())
    }

    /// Epochs between two progress checkpoints: `max_epochs / CHECKPOINTS`,
    /// but at least one.
    pub fn checkpoint_interval(&self) -> usize {
        (self.max_epochs / CHECKPOINTS).max(1)
    }
}

/// Where a `Trainer` is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainState {
    NotStarted,
    Running { epoch: usize },
    Completed { epochs: usize },
}

/// Net trainer structure.
///
/// To train Net, additional buffers are needed. We will contain them in this structure.
/// Training procedure will look like this:
/// * One allocates additional buffers by calling `Net::build_trainer`, which will consume `Net`
/// and return `Trainer` object.
/// * `Trainer::train` runs online backpropagation with momentum over the train set,
/// one update per sample, and returns the progress log.
/// * Once finished training, one can use `Trainer::teardown` to free all the additional buffers
/// and get `Net` object back.
#[derive(Debug)]
pub struct Trainer {
    pub(crate) net: Net,

    /// Buffer with equivalent structure and size as `Net::coeffs`, that will hold
    /// gradients for the current sample.
    pub(crate) gradient_buffer: Box<[f64]>,

    /// Buffer with equivalent structure and size as `Net::coeffs`, that will hold
    /// the step applied for the previous sample. It lives for a whole run.
    pub(crate) prev_delta_buffer: Box<[f64]>,

    /// Local error gradient signals of output neurons.
    output_signals: Box<[f64]>,

    /// Local error gradient signals of hidden neurons.
    hidden_signals: Box<[f64]>,

    state: TrainState,
}

impl Trainer {
    /// Consumes `Net` and builds `Trainer` object containing it.
    pub(super) fn build(net: Net) -> Trainer {
        let coeffs_total = net.coeffs.len();
        let topology = net.topology;
        Trainer {
            net,
            gradient_buffer: vec![0.0; coeffs_total].into_boxed_slice(),
            prev_delta_buffer: vec![0.0; coeffs_total].into_boxed_slice(),
            output_signals: vec![0.0; topology.outputs()].into_boxed_slice(),
            hidden_signals: vec![0.0; topology.hidden()].into_boxed_slice(),
            state: TrainState::NotStarted,
        }
    }

    /// Returns reference to contained `Net`, allowing the use of `Net::forward`.
    pub fn net_ref(&self) -> &Net {
        &self.net
    }

    /// Returns mutable reference to contained `Net`.
    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

    pub fn state(&self) -> TrainState {
        self.state
    }

    /// Fills `gradient_buffer` for one sample, given the activations `forward` produced for it.
    ///
    /// Output signals use `(t - o) * o * (1 - o)`, hidden signals the tanh derivative
    /// `(1 - h) * (1 + h)`. Gradients point uphill of the likelihood, so they are added.
    fn backpropagate(&mut self, inputs: &[f64], targets: &[f64], activations: &Activations) {
        let topology = self.net.topology;
        let Activations { hidden, outputs } = activations;

        for ((signal, &t), &o) in self
            .output_signals
            .iter_mut()
            .zip(targets.iter())
            .zip(outputs.iter())
        {
            *signal = (t - o) * o * (1.0 - o);
        }

        let layers = topology.split(&self.net.coeffs);
        for ((signal, &h), weights) in self
            .hidden_signals
            .iter_mut()
            .zip(hidden.iter())
            .zip(layers.hidden_output.chunks(topology.outputs()))
        {
            let sum: f64 = self
                .output_signals
                .iter()
                .zip(weights.iter())
                .map(|(d, w)| d * w)
                .sum();
            *signal = sum * (1.0 - h) * (1.0 + h);
        }

        let gradients = topology.split_mut(&mut self.gradient_buffer);
        for (row, &h) in gradients
            .hidden_output
            .chunks_mut(topology.outputs())
            .zip(hidden.iter())
        {
            for (g, &d) in row.iter_mut().zip(self.output_signals.iter()) {
                *g = d * h;
            }
        }
        gradients.output_biases.copy_from_slice(&self.output_signals);

        for (row, &x) in gradients
            .input_hidden
            .chunks_mut(topology.hidden())
            .zip(inputs.iter())
        {
            for (g, &d) in row.iter_mut().zip(self.hidden_signals.iter()) {
                *g = d * x;
            }
        }
        gradients.hidden_biases.copy_from_slice(&self.hidden_signals);
    }

    /// Applies `gradient_buffer` to the coefficients.
    ///
    /// For every coefficient: `delta = learn_rate * g; c += delta; c += prev * momentum; prev = delta`.
    fn apply_update(&mut self, learn_rate: f64, momentum: f64) {
        for ((c, &g), prev) in self
            .net
            .coeffs
            .iter_mut()
            .zip(self.gradient_buffer.iter())
            .zip(self.prev_delta_buffer.iter_mut())
        {
            let delta = learn_rate * g;
            *c += delta;
            *c += *prev * momentum;
            *prev = delta;
        }
    }

    /// Performs forward pass, backpropagation and update for a single sample.
    ///
    /// # Returns
    /// * The activations the sample produced before the update.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::{Net, Topology, TrainParams};
    /// let mut trainer = Net::zeroed(Topology::new(2, 2, 2).unwrap()).build_trainer();
    /// let activations = trainer
    ///     .train_sample(&[1.0, -1.0], &[1.0, 0.0], &TrainParams::default())
    ///     .unwrap();
    /// assert_eq!(&*activations.outputs, &[0.5, 0.5]);
    /// ```
    pub fn train_sample(
        &mut self,
        inputs: &[f64],
        targets: &[f64],
        params: &TrainParams,
    ) -> Result<Activations, TrainError> {
        let outputs_count = self.net.topology.outputs();
        if targets.len() != outputs_count {
            return Err(TrainError::BadTargets(SizeMismatch {
                expected: outputs_count,
                got: targets.len(),
            }));
        }

        let activations = self.net.forward(inputs)?;
        self.backpropagate(inputs, targets, &activations);
        self.apply_update(params.learn_rate, params.momentum);
        Ok(activations)
    }

    /// Evaluates the current coefficients on both sets.
    fn checkpoint(
        &self,
        epoch: usize,
        train_set: &Dataset,
        test_set: &Dataset,
        certainty: f64,
    ) -> Result<ProgressRecord, ProcessError> {
        Ok(ProgressRecord {
            epoch,
            mse: self.net.mean_squared_error(train_set)?,
            train_accuracy: self.net.accuracy(train_set, certainty)?,
            test_accuracy: self.net.accuracy(test_set, certainty)?,
        })
    }

    fn check_width(&self, dataset: &Dataset) -> Result<(), SizeMismatch> {
        let expected = self.net.topology.sample_width();
        if !dataset.is_empty() && dataset.width() != expected {
            return Err(SizeMismatch {
                expected,
                got: dataset.width(),
            });
        }
        Ok(())
    }

    /// Trains the network on `train_set`, visiting samples in an order shuffled once
    /// before the first epoch.
    ///
    /// See `Trainer::train_in_order`.
    pub fn train<R: Rng>(
        &mut self,
        train_set: &Dataset,
        test_set: &Dataset,
        params: &TrainParams,
        rng: &mut R,
    ) -> Result<ProgressLog, TrainError> {
        let order = shuffled_indices(train_set.len(), rng);
        self.train_in_order(train_set, test_set, params, &order)
    }

    /// Trains the network on `train_set` for `params.max_epochs` epochs, visiting samples
    /// in the given `order` every epoch.
    ///
    /// Every `params.checkpoint_interval()` epochs (starting with epoch 0, before any update)
    /// the train-set MSE and the accuracy on both sets are recorded.
    ///
    /// # Returns
    /// * `Ok(ProgressLog)` with all checkpoints, once all epochs are done;
    /// * `Err(TrainError)` if sets don't fit the topology, `order` refers outside of `train_set`,
    /// or coefficients stop being finite.
    pub fn train_in_order(
        &mut self,
        train_set: &Dataset,
        test_set: &Dataset,
        params: &TrainParams,
        order: &[usize],
    ) -> Result<ProgressLog, TrainError> {
        self.check_width(train_set).map_err(TrainError::BadTrainSet)?;
        self.check_width(test_set).map_err(TrainError::BadTestSet)?;
        if let Some(&index) = order.iter().find(|&&i| i >= train_set.len()) {
            return Err(TrainError::BadOrder {
                index,
                len: train_set.len(),
            });
        }

        let inputs_count = self.net.topology.inputs();
        let interval = params.checkpoint_interval();
        let mut log = ProgressLog::new();

        for delta in self.prev_delta_buffer.iter_mut() {
            *delta = 0.0;
        }

        debug!(
            samples = order.len(),
            epochs = params.max_epochs,
            interval,
            "training started"
        );

        for epoch in 0..params.max_epochs {
            self.state = TrainState::Running { epoch };

            if epoch % interval == 0 {
                let record = self.checkpoint(epoch, train_set, test_set, params.certainty)?;
                info!(
                    epoch,
                    mse = record.mse,
                    train_acc = record.train_accuracy,
                    test_acc = record.test_accuracy,
                    "checkpoint"
                );
                log.push(record);
            }

            for &index in order {
                let (inputs, targets) = train_set.sample(index, inputs_count);
                self.train_sample(inputs, targets, params)?;
            }

            if !self.net.is_finite() {
                return Err(TrainError::NonFinite { epoch });
            }
        }

        self.state = TrainState::Completed {
            epochs: params.max_epochs,
        };
        Ok(log)
    }

    /// Frees training buffers, consuming `Trainer` object, and returns contained `Net` back.
    pub fn teardown(self) -> Net {
        self.net
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainError {
    #[error("Expected {} target(s), but got {}!", .0.expected, .0.got)]
    BadTargets(SizeMismatch),
    #[error("Expected train samples of width {}, but got {}!", .0.expected, .0.got)]
    BadTrainSet(SizeMismatch),
    #[error("Expected test samples of width {}, but got {}!", .0.expected, .0.got)]
    BadTestSet(SizeMismatch),
    #[error("Sample order refers to index {index}, but train set has {len} samples!")]
    BadOrder { index: usize, len: usize },
    #[error("Coefficients became non-finite during epoch {epoch}!")]
    NonFinite { epoch: usize },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedforward::Topology;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn separable() -> Dataset {
        Dataset::from_rows(vec![
            vec![-3.0, -3.0, 1.0, 0.0].into_boxed_slice(),
            vec![3.0, 3.0, 0.0, 1.0].into_boxed_slice(),
        ])
        .unwrap()
    }

    fn params(max_epochs: usize, learn_rate: f64, momentum: f64, certainty: f64) -> TrainParams {
        TrainParams {
            max_epochs,
            learn_rate,
            momentum,
            certainty,
        }
    }

    #[test]
    fn default_params_are_valid() {
        assert_eq!(TrainParams::default().validate(), Ok(()));
        assert_eq!(TrainParams::default().checkpoint_interval(), 10);
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert_eq!(
            params(0, 0.05, 0.05, 0.99).validate(),
            Err(ConfigError::ZeroEpochs)
        );
        assert!(params(10, -0.1, 0.05, 0.99).validate().is_err());
        assert!(params(10, 0.1, f64::NAN, 0.99).validate().is_err());
        assert!(params(10, 0.1, 0.05, -1.0).validate().is_err());
    }

    #[test]
    fn short_runs_checkpoint_every_epoch() {
        assert_eq!(params(50, 0.0, 0.0, 0.0).checkpoint_interval(), 1);
        assert_eq!(params(250, 0.0, 0.0, 0.0).checkpoint_interval(), 2);
    }

    #[test]
    fn momentum_uses_previous_sample_delta() {
        let topology = Topology::new(1, 1, 1).unwrap();
        let mut trainer = Net::zeroed(topology).build_trainer();
        for g in trainer.gradient_buffer.iter_mut() {
            *g = 2.0;
        }

        trainer.apply_update(0.5, 0.1);
        assert!(trainer.net.coeffs.iter().all(|&c| c == 1.0));
        assert!(trainer.prev_delta_buffer.iter().all(|&d| d == 1.0));

        // Second step: plain delta 1.0 plus momentum 0.1 * previous delta 1.0
        trainer.apply_update(0.5, 0.1);
        assert!(trainer.net.coeffs.iter().all(|&c| (c - 2.1).abs() < 1e-12));
    }

    #[test]
    fn gradients_follow_backprop_formulas() {
        let topology = Topology::new(1, 1, 2).unwrap();
        // w_ih, b_h, w_ho[0][0], w_ho[0][1], b_o[0], b_o[1]
        let net = Net::from_coefficients(topology, Box::new([0.5, 0.0, 0.3, -0.2, 0.0, 0.0]))
            .unwrap();
        let mut trainer = net.build_trainer();
        let activations = trainer
            .train_sample(&[2.0], &[1.0, 0.0], &params(1, 0.0, 0.0, 0.0))
            .unwrap();

        let h = activations.hidden[0];
        let (o0, o1) = (activations.outputs[0], activations.outputs[1]);
        let d0 = (1.0 - o0) * o0 * (1.0 - o0);
        let d1 = (0.0 - o1) * o1 * (1.0 - o1);
        let dh = (d0 * 0.3 + d1 * -0.2) * (1.0 - h) * (1.0 + h);
        let expected = [dh * 2.0, dh, d0 * h, d1 * h, d0, d1];
        for (g, e) in trainer.gradient_buffer.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-12, "{} != {}", g, e);
        }
    }

    #[test]
    fn zero_learn_rate_and_momentum_keep_weights() {
        let topology = Topology::new(2, 3, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let net = Net::new(topology, &mut rng);
        let before = net.coefficients().to_vec();

        let mut trainer = net.build_trainer();
        let log = trainer
            .train(&separable(), &separable(), &params(20, 0.0, 0.0, 0.5), &mut rng)
            .unwrap();
        assert_eq!(log.len(), 20);
        assert_eq!(trainer.net_ref().coefficients(), &before[..]);
    }

    #[test]
    fn separable_data_is_learned() {
        let topology = Topology::new(2, 2, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut trainer = Net::new(topology, &mut rng).build_trainer();
        let data = separable();

        let log = trainer
            .train(&data, &data, &params(500, 0.1, 0.05, 0.0), &mut rng)
            .unwrap();

        assert_eq!(trainer.state(), TrainState::Completed { epochs: 500 });
        assert_eq!(trainer.net_ref().accuracy(&data, 0.0).unwrap(), 1.0);
        let first = log.records().first().unwrap();
        let last = log.records().last().unwrap();
        assert_eq!(first.epoch, 0);
        assert_eq!(last.epoch, 495);
        assert!(last.mse < first.mse);
    }

    #[test]
    fn mismatched_sets_are_rejected() {
        let mut trainer = Net::zeroed(Topology::new(4, 5, 2).unwrap()).build_trainer();
        let data = separable();
        assert_eq!(
            trainer.train_in_order(&data, &data, &TrainParams::default(), &[0, 1]),
            Err(TrainError::BadTrainSet(SizeMismatch {
                expected: 6,
                got: 4
            }))
        );
        assert_eq!(trainer.state(), TrainState::NotStarted);
    }

    #[test]
    fn out_of_range_order_is_rejected() {
        let mut trainer = Net::zeroed(Topology::new(2, 2, 2).unwrap()).build_trainer();
        let data = separable();
        assert_eq!(
            trainer.train_in_order(&data, &data, &TrainParams::default(), &[0, 2]),
            Err(TrainError::BadOrder { index: 2, len: 2 })
        );
    }

    #[test]
    fn non_finite_coefficients_abort_training() {
        let topology = Topology::new(2, 2, 2).unwrap();
        let mut coeffs = vec![0.0; topology.coeffs_total()];
        coeffs[0] = f64::NAN;
        let mut trainer = Net::from_coefficients(topology, coeffs.into_boxed_slice())
            .unwrap()
            .build_trainer();
        let data = separable();
        assert_eq!(
            trainer.train_in_order(&data, &data, &params(5, 0.1, 0.0, 0.0), &[0, 1]),
            Err(TrainError::NonFinite { epoch: 0 })
        );
    }
}

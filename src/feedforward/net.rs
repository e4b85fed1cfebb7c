use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use thiserror::Error;

use super::trainer::Trainer;

/// Lower bound (inclusive) of freshly initialized coefficients.
pub const INIT_LOW: f64 = 0.0001;
/// Upper bound (exclusive) of freshly initialized coefficients.
pub const INIT_HIGH: f64 = 0.001;

/// Sums beyond this magnitude saturate `bounded_tanh` to exactly ±1.
pub const TANH_SATURATION: f64 = 20.0;

/// Geometry of a network with a single hidden layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    inputs: usize,
    hidden: usize,
    outputs: usize,
}

impl Topology {
    /// Returns topology for the given layer sizes.
    ///
    /// # Returns
    /// * `Ok(Topology)` if every layer has at least one neuron;
    /// * `Err(NewNetError::BadTopology)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::Topology;
    /// let topology = Topology::new(4, 5, 2).unwrap();
    /// assert_eq!(topology.coeffs_total(), 4 * 5 + 5 + 5 * 2 + 2);
    /// assert!(Topology::new(4, 0, 2).is_err());
    /// ```
    pub fn new(inputs: usize, hidden: usize, outputs: usize) -> Result<Topology, NewNetError> {
        if inputs == 0 || hidden == 0 || outputs == 0 {
            return Err(NewNetError::BadTopology {
                inputs,
                hidden,
                outputs,
            });
        }
        Ok(Topology {
            inputs,
            hidden,
            outputs,
        })
    }

    pub fn inputs(&self) -> usize {
        self.inputs
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Width of a prepared sample: inputs followed by one-hot targets.
    pub fn sample_width(&self) -> usize {
        self.inputs + self.outputs
    }

    /// Number of all coefficients (weights + biases) of the network.
    pub fn coeffs_total(&self) -> usize {
        self.inputs * self.hidden + self.hidden + self.hidden * self.outputs + self.outputs
    }

    /// Splits a coefficient-shaped buffer into its four parameter groups.
    /// (See `Net::coeffs` documentation for the layout.)
    pub fn split<'a>(&self, buffer: &'a [f64]) -> Layers<'a> {
        let (input_hidden, rest) = buffer.split_at(self.inputs * self.hidden);
        let (hidden_biases, rest) = rest.split_at(self.hidden);
        let (hidden_output, output_biases) = rest.split_at(self.hidden * self.outputs);
        Layers {
            input_hidden,
            hidden_biases,
            hidden_output,
            output_biases,
        }
    }

    /// Mutable counterpart of `Topology::split`.
    pub fn split_mut<'a>(&self, buffer: &'a mut [f64]) -> LayersMut<'a> {
        let (input_hidden, rest) = buffer.split_at_mut(self.inputs * self.hidden);
        let (hidden_biases, rest) = rest.split_at_mut(self.hidden);
        let (hidden_output, output_biases) = rest.split_at_mut(self.hidden * self.outputs);
        LayersMut {
            input_hidden,
            hidden_biases,
            hidden_output,
            output_biases,
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Topology {
            inputs: 4,
            hidden: 5,
            outputs: 2,
        }
    }
}

/// Borrowed view of the parameter groups of a coefficient-shaped buffer.
#[derive(Debug, Clone, Copy)]
pub struct Layers<'a> {
    /// `[inputs x hidden]`, row-major by input neuron.
    pub input_hidden: &'a [f64],
    pub hidden_biases: &'a [f64],
    /// `[hidden x outputs]`, row-major by hidden neuron.
    pub hidden_output: &'a [f64],
    pub output_biases: &'a [f64],
}

#[derive(Debug)]
pub struct LayersMut<'a> {
    pub input_hidden: &'a mut [f64],
    pub hidden_biases: &'a mut [f64],
    pub hidden_output: &'a mut [f64],
    pub output_biases: &'a mut [f64],
}

/// Activations produced by `Net::forward` for a single sample.
///
/// Backpropagation for a sample consumes the activations of that very sample,
/// so the pair is handed out by value instead of being cached inside `Net`.
#[derive(Debug, Clone, PartialEq)]
pub struct Activations {
    /// Outputs of the hidden layer (after `bounded_tanh`).
    pub hidden: Box<[f64]>,
    /// Outputs of the network (after `softmax`).
    pub outputs: Box<[f64]>,
}

/// Neural network structure
#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub(super) topology: Topology,

    /// Array of coefficients (weights & biases).
    ///
    /// All coefficients are stored altogether, grouped by kind:
    /// `coeffs = [input->hidden weights][hidden biases][hidden->output weights][output biases]`
    /// Weight matrices are row-major by source neuron, so the weight between
    /// input `i` and hidden neuron `j` is `coeffs[i * hidden + j]`.
    /// This is also the order of `Net::coefficients` and `Net::from_coefficients`.
    pub(super) coeffs: Box<[f64]>,
}

impl Net {
    /// Returns network for given topology with every coefficient set to zero.
    pub fn zeroed(topology: Topology) -> Net {
        Net {
            topology,
            coeffs: vec![0.0; topology.coeffs_total()].into_boxed_slice(),
        }
    }

    /// Returns network for given topology.
    /// It will have random coefficients drawn uniformly from `[INIT_LOW, INIT_HIGH)`.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::{Net, Topology};
    /// # use rand::SeedableRng;
    /// let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    /// let net = Net::new(Topology::new(4, 5, 2).unwrap(), &mut rng);
    /// assert!(net.coefficients().iter().all(|&c| c >= 0.0001 && c < 0.001));
    /// ```
    pub fn new<R: Rng>(topology: Topology, rng: &mut R) -> Net {
        let mut net = Net::zeroed(topology);
        net.randomize(rng);
        net
    }

    /// Returns network for given topology using given coefficients.
    ///
    /// # Returns
    /// * `Ok(Net)` if amount of coefficients is right;
    /// * `Err(NewNetError::BadCoefficients)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::{Net, Topology};
    /// let topology = Topology::new(1, 1, 1).unwrap();
    /// let net = Net::from_coefficients(topology, Box::new([0.27, 0.3, 7.5, 0.0])).unwrap();
    /// assert!(Net::from_coefficients(topology, Box::new([0.27])).is_err());
    /// ```
    pub fn from_coefficients(
        topology: Topology,
        coefficients: Box<[f64]>,
    ) -> Result<Net, NewNetError> {
        if coefficients.len() != topology.coeffs_total() {
            return Err(NewNetError::BadCoefficients(SizeMismatch {
                expected: topology.coeffs_total(),
                got: coefficients.len(),
            }));
        }
        Ok(Net {
            topology,
            coeffs: coefficients,
        })
    }

    /// Redraws every coefficient independently from `[INIT_LOW, INIT_HIGH)`.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        let between = Uniform::from(INIT_LOW..INIT_HIGH);
        for c in self.coeffs.iter_mut() {
            *c = between.sample(rng);
        }
    }

    /// Overwrites all coefficients, keeping the topology.
    pub fn set_coefficients(&mut self, coefficients: &[f64]) -> Result<(), NewNetError> {
        if coefficients.len() != self.coeffs.len() {
            return Err(NewNetError::BadCoefficients(SizeMismatch {
                expected: self.coeffs.len(),
                got: coefficients.len(),
            }));
        }
        self.coeffs.copy_from_slice(coefficients);
        Ok(())
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn layers(&self) -> Layers<'_> {
        self.topology.split(&self.coeffs)
    }

    /// Whether no coefficient became NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }

    /// Hyperbolic tangent, saturated to exactly ±1 outside `[-TANH_SATURATION, TANH_SATURATION]`.
    pub fn bounded_tanh(x: f64) -> f64 {
        if x > TANH_SATURATION {
            1.0
        } else if x < -TANH_SATURATION {
            -1.0
        } else {
            x.tanh()
        }
    }

    /// Softmax function with a shared denominator.
    /// Implements the formula:
    /// `exp(x_k) / sum(exp(x))`.
    pub fn softmax(sums: &[f64]) -> Box<[f64]> {
        let denominator: f64 = sums.iter().map(|s| s.exp()).sum();
        sums.iter().map(|s| s.exp() / denominator).collect()
    }

    /// Weighted sum of `activations` with column `column` of a row-major matrix `width` wide.
    fn column_product(activations: &[f64], weights: &[f64], width: usize, column: usize) -> f64 {
        activations
            .iter()
            .zip(weights[column..].iter().step_by(width))
            .map(|(a, w)| a * w)
            .sum()
    }

    /// Calculates hidden and output activations of the network for given inputs.
    ///
    /// # Returns
    /// * `Ok(Activations)` if amount of inputs is right;
    /// * `Err(ProcessError)` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::{Net, Topology};
    /// let net = Net::zeroed(Topology::new(2, 2, 2).unwrap());
    /// let activations = net.forward(&[3.0, -1.0]).unwrap();
    /// assert_eq!(&*activations.outputs, &[0.5, 0.5]);
    /// ```
    pub fn forward(&self, inputs: &[f64]) -> Result<Activations, ProcessError> {
        if inputs.len() != self.topology.inputs {
            return Err(ProcessError::BadInputs(SizeMismatch {
                expected: self.topology.inputs,
                got: inputs.len(),
            }));
        }

        let layers = self.layers();
        let hidden_count = self.topology.hidden;
        let outputs_count = self.topology.outputs;

        let hidden: Box<[f64]> = layers
            .hidden_biases
            .iter()
            .enumerate()
            .map(|(j, &bias)| {
                let sum = Net::column_product(inputs, layers.input_hidden, hidden_count, j);
                Net::bounded_tanh(sum + bias)
            })
            .collect();

        let sums: Vec<f64> = layers
            .output_biases
            .iter()
            .enumerate()
            .map(|(k, &bias)| {
                Net::column_product(&hidden, layers.hidden_output, outputs_count, k) + bias
            })
            .collect();

        Ok(Activations {
            hidden,
            outputs: Net::softmax(&sums),
        })
    }

    /// Calculates output of the network using given input.
    pub fn predict(&self, inputs: &[f64]) -> Result<Box<[f64]>, ProcessError> {
        Ok(self.forward(inputs)?.outputs)
    }

    /// Consumes `Net` and builds `Trainer` object containing it.
    /// See `Trainer`'s documentation for details.
    pub fn build_trainer(self) -> Trainer {
        Trainer::build(self)
    }
}

/// Error structure for `Topology::new` and `Net::from_coefficients`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NewNetError {
    #[error(
        "Every layer must have at least one neuron, \
        but got {inputs} input(s), {hidden} hidden and {outputs} output(s)!"
    )]
    BadTopology {
        inputs: usize,
        hidden: usize,
        outputs: usize,
    },
    #[error("Expected {} coefficients because of provided topology, but got {}!", .0.expected, .0.got)]
    BadCoefficients(SizeMismatch),
}

/// Error structure for `Net::forward` and the metrics
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProcessError {
    #[error("Expected {} input(s), but got {}!", .0.expected, .0.got)]
    BadInputs(SizeMismatch),
    #[error("Expected samples of width {}, but dataset has width {}!", .0.expected, .0.got)]
    BadSampleWidth(SizeMismatch),
}

/// Error structure for collections size mismatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Expected {expected} values, but got {got}!")]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn topology(inputs: usize, hidden: usize, outputs: usize) -> Topology {
        Topology::new(inputs, hidden, outputs).unwrap()
    }

    #[test]
    fn zero_sized_layers_are_rejected() {
        assert!(matches!(
            Topology::new(0, 5, 2),
            Err(NewNetError::BadTopology { inputs: 0, .. })
        ));
        assert!(Topology::new(4, 5, 0).is_err());
    }

    #[test]
    fn split_follows_serialization_order() {
        let t = topology(2, 3, 2);
        let buffer: Vec<f64> = (0..t.coeffs_total()).map(|i| i as f64).collect();
        let layers = t.split(&buffer);
        assert_eq!(layers.input_hidden, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(layers.hidden_biases, &[6.0, 7.0, 8.0]);
        assert_eq!(layers.hidden_output, &[9.0, 10.0, 11.0, 12.0, 13.0, 14.0]);
        assert_eq!(layers.output_biases, &[15.0, 16.0]);
    }

    #[test]
    fn random_init_stays_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let net = Net::new(topology(4, 5, 2), &mut rng);
        assert_eq!(net.coefficients().len(), 37);
        assert!(net
            .coefficients()
            .iter()
            .all(|&c| (INIT_LOW..INIT_HIGH).contains(&c)));
    }

    #[test]
    fn same_seed_gives_same_net() {
        let a = Net::new(topology(4, 5, 2), &mut ChaCha8Rng::seed_from_u64(9));
        let b = Net::new(topology(4, 5, 2), &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn zero_net_outputs_halves() {
        let net = Net::zeroed(topology(2, 2, 2));
        for inputs in [[0.0, 0.0], [1.0, -7.5], [100.0, 3.0]].iter() {
            let activations = net.forward(inputs).unwrap();
            assert_eq!(&*activations.outputs, &[0.5, 0.5]);
            assert_eq!(&*activations.hidden, &[0.0, 0.0]);
        }
    }

    #[test]
    fn forward_matches_hand_computation() {
        // 1 input, 2 hidden, 2 outputs
        let t = topology(1, 2, 2);
        let coeffs = [0.5, -0.25, 0.1, 0.0, 1.0, -1.0, 0.5, 0.5, 0.0, 0.2];
        let net = Net::from_coefficients(t, Box::new(coeffs)).unwrap();
        let activations = net.forward(&[2.0]).unwrap();

        let h0 = (2.0f64 * 0.5 + 0.1).tanh();
        let h1 = (2.0f64 * -0.25 + 0.0).tanh();
        assert!((activations.hidden[0] - h0).abs() < 1e-12);
        assert!((activations.hidden[1] - h1).abs() < 1e-12);

        let s0 = h0 * 1.0 + h1 * 0.5;
        let s1 = h0 * -1.0 + h1 * 0.5 + 0.2;
        let denominator = s0.exp() + s1.exp();
        assert!((activations.outputs[0] - s0.exp() / denominator).abs() < 1e-12);
        assert!((activations.outputs[1] - s1.exp() / denominator).abs() < 1e-12);
    }

    #[test]
    fn forward_rejects_wrong_input_count() {
        let net = Net::zeroed(topology(4, 5, 2));
        assert_eq!(
            net.forward(&[1.0, 2.0]),
            Err(ProcessError::BadInputs(SizeMismatch {
                expected: 4,
                got: 2
            }))
        );
    }

    #[test]
    fn coefficients_can_be_replaced() {
        let mut net = Net::zeroed(topology(1, 1, 1));
        net.set_coefficients(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(net.coefficients(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            net.set_coefficients(&[1.0]),
            Err(NewNetError::BadCoefficients(SizeMismatch {
                expected: 4,
                got: 1
            }))
        );
    }

    #[test]
    fn bounded_tanh_saturates_exactly() {
        assert_eq!(Net::bounded_tanh(20.5), 1.0);
        assert_eq!(Net::bounded_tanh(-1e300), -1.0);
        assert_eq!(Net::bounded_tanh(20.0), 20.0f64.tanh());
        assert_eq!(Net::bounded_tanh(0.3), 0.3f64.tanh());
    }

    proptest! {
        #[test]
        fn bounded_tanh_is_bounded(x in -1e6..1e6f64) {
            let y = Net::bounded_tanh(x);
            prop_assert!((-1.0..=1.0).contains(&y));
            if x.abs() <= TANH_SATURATION {
                prop_assert_eq!(y, x.tanh());
            } else {
                prop_assert_eq!(y.abs(), 1.0);
            }
        }

        #[test]
        fn softmax_is_a_distribution(sums in proptest::collection::vec(-30.0..30.0f64, 1..8)) {
            let outputs = Net::softmax(&sums);
            let total: f64 = outputs.iter().sum();
            prop_assert!((total - 1.0).abs() < 1e-9);
            prop_assert!(outputs.iter().all(|&o| o > 0.0));
        }
    }
}

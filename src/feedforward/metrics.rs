//! Error and accuracy of a `Net` over a whole dataset.

use super::net::{Net, ProcessError, SizeMismatch};
use crate::data::Dataset;

/// Index of the first maximal element.
/// Later elements replace the current maximum only when strictly greater.
///
/// # Examples
/// ```
/// # use bpnnet::feedforward::max_index;
/// assert_eq!(max_index(&[0.2, 0.7, 0.7]), 1);
/// assert_eq!(max_index(&[0.5, 0.5]), 0);
/// ```
pub fn max_index(values: &[f64]) -> usize {
    let mut max_index = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if values[max_index] < v {
            max_index = i;
        }
    }
    max_index
}

impl Net {
    /// Calculates cost function of an output values given the desired values.
    /// Implements the formula:
    /// `||outputs - desired outputs||^2`
    ///
    /// # Returns
    /// * `Ok(f64)` if `outputs` and `desired_outputs` have the same size;
    /// * `SizeMismatch` otherwise.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::feedforward::Net;
    /// let outputs = [10.0; 1000];
    /// let desired_outputs = [10.25; 1000];
    /// let cost = Net::calc_cost(&outputs, &desired_outputs).unwrap();
    /// assert_eq!(cost, 62.5);
    /// ```
    pub fn calc_cost(outputs: &[f64], desired_outputs: &[f64]) -> Result<f64, SizeMismatch> {
        if outputs.len() != desired_outputs.len() {
            return Err(SizeMismatch {
                expected: outputs.len(),
                got: desired_outputs.len(),
            });
        };

        Ok(outputs
            .iter()
            .zip(desired_outputs.iter())
            .map(|(&a, &b)| (b - a) * (b - a))
            .sum())
    }

    fn check_dataset(&self, dataset: &Dataset) -> Result<(), ProcessError> {
        let expected = self.topology.sample_width();
        if !dataset.is_empty() && dataset.width() != expected {
            return Err(ProcessError::BadSampleWidth(SizeMismatch {
                expected,
                got: dataset.width(),
            }));
        }
        Ok(())
    }

    /// Mean over all samples of the squared distance between prediction and target.
    /// An empty dataset has zero error.
    pub fn mean_squared_error(&self, dataset: &Dataset) -> Result<f64, ProcessError> {
        self.check_dataset(dataset)?;
        if dataset.is_empty() {
            return Ok(0.0);
        }

        let mut sum = 0.0;
        for (inputs, targets) in dataset.samples(self.topology.inputs()) {
            let outputs = self.predict(inputs)?;
            sum += Net::calc_cost(&outputs, targets).map_err(ProcessError::BadSampleWidth)?;
        }
        Ok(sum / dataset.len() as f64)
    }

    /// Share of samples classified correctly and with certainty.
    ///
    /// A prediction with `|out[0] - out[1]| < certainty` counts as unsure, and so as incorrect,
    /// whatever its argmax is. Only the first two outputs take part in that test; with a single
    /// output node no prediction is unsure. Otherwise a prediction is correct when its
    /// `max_index` equals the target's. An empty dataset has zero accuracy.
    pub fn accuracy(&self, dataset: &Dataset, certainty: f64) -> Result<f64, ProcessError> {
        self.check_dataset(dataset)?;
        if dataset.is_empty() {
            return Ok(0.0);
        }

        let mut correct = 0usize;
        for (inputs, targets) in dataset.samples(self.topology.inputs()) {
            let outputs = self.predict(inputs)?;
            let unsure = outputs.len() >= 2 && (outputs[0] - outputs[1]).abs() < certainty;
            if !unsure && max_index(&outputs) == max_index(targets) {
                correct += 1;
            }
        }
        Ok(correct as f64 / dataset.len() as f64)
    }
}

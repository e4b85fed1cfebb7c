//! Reading labelled samples and splitting them into train and test sets.
//!
//! Raw rows are comma-separated reals whose last value is the class label, 0 or 1.
//! Preparation replaces the label with a two-wide one-hot target:
//! class 0 becomes `(1, 0)` and class 1 becomes `(0, 1)`.

use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};

/// How many times the index sequence is shuffled.
pub const SHUFFLE_ROUNDS: usize = 10;

/// Ordered samples of identical width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    width: usize,
    rows: Vec<Box<[f64]>>,
}

impl Dataset {
    pub fn empty() -> Dataset {
        Dataset::default()
    }

    /// Builds a dataset out of prepared rows.
    ///
    /// # Returns
    /// * `Ok(Dataset)` if all rows have the width of the first one;
    /// * `Err(FormatError::BadWidth)` otherwise.
    pub fn from_rows(rows: Vec<Box<[f64]>>) -> std::result::Result<Dataset, FormatError> {
        let width = rows.first().map_or(0, |r| r.len());
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(FormatError::BadWidth {
                line: i + 1,
                expected: width,
                got: row.len(),
            });
        }
        Ok(Dataset { width, rows })
    }

    /// Parses raw text, one sample per line, and appends one-hot targets.
    /// Blank lines are skipped; line numbers in errors count them anyway.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::data::Dataset;
    /// let dataset = Dataset::parse("-0.5,1.2,0.3,-2.0,0\n3.6,8.1,-2.8,-0.4,1\n").unwrap();
    /// assert_eq!(dataset.row(0), &[-0.5, 1.2, 0.3, -2.0, 1.0, 0.0]);
    /// assert_eq!(dataset.row(1), &[3.6, 8.1, -2.8, -0.4, 0.0, 1.0]);
    /// ```
    pub fn parse(text: &str) -> std::result::Result<Dataset, FormatError> {
        let mut raw_width = None;
        let mut rows = Vec::new();

        for (i, line) in text.lines().enumerate() {
            let line_number = i + 1;
            if line.trim().is_empty() {
                continue;
            }

            let mut values = line
                .split(',')
                .enumerate()
                .map(|(column, field)| {
                    let field = field.trim();
                    field.parse::<f64>().map_err(|_| FormatError::BadValue {
                        line: line_number,
                        column: column + 1,
                        value: field.to_owned(),
                    })
                })
                .collect::<std::result::Result<Vec<f64>, FormatError>>()?;

            let expected = *raw_width.get_or_insert(values.len());
            if values.len() != expected {
                return Err(FormatError::BadWidth {
                    line: line_number,
                    expected,
                    got: values.len(),
                });
            }

            // `split` always yields at least one field
            let label = values.pop().unwrap_or_default();
            if label != 0.0 && label != 1.0 {
                return Err(FormatError::BadLabel {
                    line: line_number,
                    value: label,
                });
            }
            values.push(1.0 - label);
            values.push(label);
            rows.push(values.into_boxed_slice());
        }

        if rows.is_empty() {
            return Err(FormatError::Empty);
        }
        Dataset::from_rows(rows)
    }

    /// Reads and parses a data file. See `Dataset::parse`.
    pub fn read_file(path: &Path) -> Result<Dataset> {
        let text = fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
        let dataset = Dataset::parse(&text)?;
        debug!(rows = dataset.len(), width = dataset.width(), "dataset parsed");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of every row; zero for an empty dataset.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn rows(&self) -> &[Box<[f64]>] {
        &self.rows
    }

    /// Splits row `index` into its first `inputs` values and the targets after them.
    pub fn sample(&self, index: usize, inputs: usize) -> (&[f64], &[f64]) {
        self.rows[index].split_at(inputs)
    }

    /// Iterates over `(inputs, targets)` pairs. See `Dataset::sample`.
    pub fn samples(&self, inputs: usize) -> impl Iterator<Item = (&[f64], &[f64])> + '_ {
        self.rows.iter().map(move |row| row.split_at(inputs))
    }

    /// Randomly distributes rows between a train and a test set.
    ///
    /// The train set receives the first `floor(train_fraction * len)` rows of a random
    /// permutation, the test set all the others.
    pub fn partition<R: Rng>(&self, train_fraction: f64, rng: &mut R) -> (Dataset, Dataset) {
        let total = self.rows.len();
        let train_count = ((train_fraction * total as f64) as usize).min(total);
        let order = shuffled_indices(total, rng);
        let (train_order, test_order) = order.split_at(train_count);

        let pick = |indices: &[usize]| Dataset {
            width: self.width,
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        };
        (pick(train_order), pick(test_order))
    }
}

/// Returns a random permutation of `0..size`, shuffled `SHUFFLE_ROUNDS` times.
pub fn shuffled_indices<R: Rng>(size: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..size).collect();
    for _ in 0..SHUFFLE_ROUNDS {
        indices.shuffle(rng);
    }
    indices
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("line {line}, column {column}: {value:?} is not a number")]
    BadValue {
        line: usize,
        column: usize,
        value: String,
    },
    #[error("line {line}: expected {expected} values, but got {got}")]
    BadWidth {
        line: usize,
        expected: usize,
        got: usize,
    },
    #[error("line {line}: class label must be 0 or 1, but got {value}")]
    BadLabel { line: usize, value: f64 },
    #[error("no samples found")]
    Empty,
}

//! Progress log of a training run.
//!
//! The log is kept in memory and written out in one piece once training is over:
//! ```text
//! epoch: MSE: TrainAcc: TestAcc:
//! 0 0,250000000000000 0,000000000000000 0,000000000000000
//! ```

use std::io::{self, Write};

/// First line of a rendered log.
pub const HEADER: &str = "epoch: MSE: TrainAcc: TestAcc:";

/// Digits after the decimal separator.
pub const PRECISION: usize = 15;

/// Decimal separator used unless configured otherwise.
pub const DEFAULT_SEPARATOR: char = ',';

/// Metrics taken at one checkpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressRecord {
    pub epoch: usize,
    /// Mean squared error over the train set.
    pub mse: f64,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressLog {
    records: Vec<ProgressRecord>,
}

fn format_real(value: f64, separator: char) -> String {
    let formatted = format!("{:.*}", PRECISION, value);
    if separator == '.' {
        formatted
    } else {
        formatted.replace('.', separator.encode_utf8(&mut [0; 4]))
    }
}

impl ProgressLog {
    pub fn new() -> ProgressLog {
        ProgressLog::default()
    }

    pub fn push(&mut self, record: ProgressRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ProgressRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Renders the header and one space-separated line per record.
    ///
    /// # Examples
    /// ```
    /// # use bpnnet::report::{ProgressLog, ProgressRecord};
    /// let mut log = ProgressLog::new();
    /// log.push(ProgressRecord { epoch: 10, mse: 0.5, train_accuracy: 0.75, test_accuracy: 1.0 });
    /// assert_eq!(
    ///     log.render(','),
    ///     "epoch: MSE: TrainAcc: TestAcc:\n\
    ///      10 0,500000000000000 0,750000000000000 1,000000000000000\n"
    /// );
    /// ```
    pub fn render(&self, separator: char) -> String {
        let mut text = String::with_capacity(HEADER.len() + 1 + self.records.len() * 64);
        text.push_str(HEADER);
        text.push('\n');
        for record in &self.records {
            text.push_str(&format!(
                "{} {} {} {}\n",
                record.epoch,
                format_real(record.mse, separator),
                format_real(record.train_accuracy, separator),
                format_real(record.test_accuracy, separator),
            ));
        }
        text
    }

    /// Writes the whole rendered log to `sink` in a single write.
    pub fn write_to<W: Write>(&self, sink: &mut W, separator: char) -> io::Result<()> {
        sink.write_all(self.render(separator).as_bytes())?;
        sink.flush()
    }
}

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use bpnnet::config::FileConfig;
use bpnnet::logging;

/// Trains a one-hidden-layer network to authenticate banknotes and logs its progress.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Data file: comma-separated features, class label (0 or 1) last
    #[arg(value_name = "PATH")]
    data: Option<PathBuf>,
    /// Progress log destination [default: next to the data file]
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// YAML file with any of the options below; flags take precedence
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// [default: 4]
    #[arg(long, value_name = "INT")]
    input_nodes: Option<usize>,
    /// [default: 5]
    #[arg(long, value_name = "INT")]
    hidden_nodes: Option<usize>,
    /// [default: 2]
    #[arg(long, value_name = "INT")]
    output_nodes: Option<usize>,
    /// Share of rows used for training [default: 0.8]
    #[arg(long, value_name = "REAL")]
    train_fraction: Option<f64>,
    /// [default: 1000]
    #[arg(short, long, value_name = "INT")]
    epochs: Option<usize>,
    /// [default: 0.05]
    #[arg(long, value_name = "REAL")]
    learn_rate: Option<f64>,
    /// [default: 0.05]
    #[arg(long, value_name = "REAL")]
    momentum: Option<f64>,
    /// Minimal gap between the two outputs for a prediction to count [default: 0.99]
    #[arg(long, value_name = "REAL")]
    certainty: Option<f64>,
    /// Seed for weight init and shuffling [default: random]
    #[arg(short, long, value_name = "INT")]
    seed: Option<u64>,
    /// Decimal separator of numbers in the log [default: ,]
    #[arg(long, value_name = "CHAR")]
    decimal_separator: Option<char>,
    /// Show debug events
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            data: self.data.clone(),
            output: self.output.clone(),
            input_nodes: self.input_nodes,
            hidden_nodes: self.hidden_nodes,
            output_nodes: self.output_nodes,
            train_fraction: self.train_fraction,
            epochs: self.epochs,
            learn_rate: self.learn_rate,
            momentum: self.momentum,
            certainty: self.certainty,
            seed: self.seed,
            decimal_separator: self.decimal_separator,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = file_config
        .merge(cli.overrides())
        .into_run_config()
        .context("invalid configuration")?;

    info!("starting training");
    let outcome = bpnnet::run(&config)?;
    info!(
        train_acc = outcome.train_accuracy,
        test_acc = outcome.test_accuracy,
        "training finished"
    );
    Ok(())
}

//! Feedforward neural network with one hidden layer, trained by online backpropagation
//! with momentum

mod metrics;
mod net;
mod trainer;

pub use metrics::*;
pub use net::*;
pub use trainer::*;

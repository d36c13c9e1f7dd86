pub mod agent;
pub mod config;
pub mod env;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod rng;
pub mod tensors;
pub mod trainer;

use anyhow::Result;

/// A learning algorithm. `SequentialTrainer` is the only implementation for now, an
/// off policy alternative would implement it as well.
pub trait Algorithm {
    fn train(&mut self) -> Result<()>;
}

pub mod ppo;

pub use ppo::{Ppo, PpoBuilder};

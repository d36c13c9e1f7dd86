use anyhow::Result;
use candle_core::Tensor;

/// Shape summary of a vectorized environment.
#[derive(Debug, Clone, Copy)]
pub struct EnvDescription {
    pub observation_dim: usize,
    pub action_dim: usize,
    pub num_envs: usize,
}

/// A vectorized environment: every call covers all parallel sub-environments at
/// once. Sub-environments that finish an episode are expected to reset themselves,
/// the way physics simulators with fixed batch sizes do.
pub trait Env {
    /// Initial observation batch, shape `(num_envs, observation_dim)`.
    fn reset(&mut self) -> Result<Tensor>;

    /// Advance every sub-environment by one step. Returns
    /// `(next_states, rewards, dones)` with shapes `(num_envs, observation_dim)`,
    /// `(num_envs,)` and `(num_envs,)`.
    fn step(&mut self, actions: &Tensor) -> Result<(Tensor, Tensor, Tensor)>;

    fn description(&self) -> EnvDescription;
}

use candle_core::Tensor;

/// One timestep worth of data for every parallel environment. `states` and
/// `actions` carry a leading `num_envs` dimension, the rest are `(num_envs,)`
/// vectors. Immutable once appended to memory.
#[derive(Debug, Clone)]
pub struct TransitionBatch {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub dones: Tensor,
    pub log_prob: Tensor,
    pub values: Tensor,
}

/// The full rollout window flattened to `(rollouts * num_envs, ..)` tensors, ready
/// for the epoch loop.
#[derive(Debug, Clone)]
pub struct RolloutSample {
    pub states: Tensor,
    pub actions: Tensor,
    pub log_prob: Tensor,
    pub values: Tensor,
    pub returns: Tensor,
    pub advantages: Tensor,
}

/// Hyperparameters of the return/advantage computation.
#[derive(Debug, Clone, Copy)]
pub struct GaeParams {
    pub discount_factor: f32,
    pub lambda_coefficient: f32,
    pub normalize_returns: bool,
    pub normalize_advantages: bool,
}

impl Default for GaeParams {
    fn default() -> Self {
        Self {
            discount_factor: 0.99,
            lambda_coefficient: 0.99,
            normalize_returns: false,
            normalize_advantages: true,
        }
    }
}

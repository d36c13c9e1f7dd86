use anyhow::{Result, ensure};
use candle_core::{DType, Tensor};
use oxrl_core::memory::{GaeParams, RolloutSample, TransitionBatch};

/// Fixed-capacity window of batched transitions, one slot per environment timestep.
///
/// The window holds exactly one rollout cycle: once full, `add_samples` wraps around
/// and overwrites the oldest slot. Slot order equals collection order whenever the
/// update cadence is a multiple of the capacity, which the PPO agent guarantees by
/// sizing the window to its rollout length.
///
/// `returns` and `advantages` are undefined until `compute_returns_and_advantages`
/// runs; any subsequent `add_samples` invalidates them again, so a stale window can
/// never be sampled.
pub struct RolloutMemory {
    capacity: usize,
    num_envs: usize,
    states: Vec<Tensor>,
    actions: Vec<Tensor>,
    rewards: Vec<Tensor>,
    dones: Vec<Tensor>,
    log_prob: Vec<Tensor>,
    values: Vec<Tensor>,
    returns: Vec<Tensor>,
    advantages: Vec<Tensor>,
    position: usize,
}

impl RolloutMemory {
    pub fn new(capacity: usize, num_envs: usize) -> Result<Self> {
        ensure!(capacity > 0, "rollout memory capacity must be at least 1");
        ensure!(num_envs > 0, "rollout memory needs at least one environment");
        Ok(Self {
            capacity,
            num_envs,
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            dones: Vec::with_capacity(capacity),
            log_prob: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            returns: vec![],
            advantages: vec![],
            position: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled slots.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.states.len() == self.capacity
    }

    /// Drop every slot and start a fresh cycle at position zero.
    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
        self.dones.clear();
        self.log_prob.clear();
        self.values.clear();
        self.returns.clear();
        self.advantages.clear();
        self.position = 0;
    }

    /// Append one synchronized timestep batch. Overwrites the oldest slot once the
    /// window is full and invalidates any previously computed returns/advantages.
    pub fn add_samples(&mut self, batch: TransitionBatch) -> Result<()> {
        ensure!(
            batch.states.dim(0)? == self.num_envs,
            "expected a batch of {} environments, got {}",
            self.num_envs,
            batch.states.dim(0)?
        );
        let dones = batch.dones.to_dtype(DType::F32)?;
        if self.states.len() < self.capacity {
            self.states.push(batch.states);
            self.actions.push(batch.actions);
            self.rewards.push(batch.rewards);
            self.dones.push(dones);
            self.log_prob.push(batch.log_prob);
            self.values.push(batch.values);
        } else {
            self.states[self.position] = batch.states;
            self.actions[self.position] = batch.actions;
            self.rewards[self.position] = batch.rewards;
            self.dones[self.position] = dones;
            self.log_prob[self.position] = batch.log_prob;
            self.values[self.position] = batch.values;
        }
        self.position = (self.position + 1) % self.capacity;
        self.returns.clear();
        self.advantages.clear();
        Ok(())
    }

    /// Backward GAE recursion over the whole window, bootstrapped by `last_values`,
    /// the value estimate of the state right after the final recorded transition:
    ///
    /// ```text
    /// delta_t = r_t + gamma * (1 - done_t) * V_{t+1} - V_t
    /// A_t     = delta_t + gamma * lambda * (1 - done_t) * A_{t+1}
    /// R_t     = A_t + V_t
    /// ```
    pub fn compute_returns_and_advantages(
        &mut self,
        last_values: &Tensor,
        params: &GaeParams,
    ) -> Result<()> {
        ensure!(!self.states.is_empty(), "the rollout window is empty");
        let steps = self.states.len();
        let gamma = params.discount_factor as f64;
        let lambda = params.lambda_coefficient as f64;

        let mut advantages = vec![None; steps];
        let mut returns = vec![None; steps];
        let mut next_advantage = Tensor::zeros_like(last_values)?;
        for t in (0..steps).rev() {
            let next_values = if t == steps - 1 {
                last_values
            } else {
                &self.values[t + 1]
            };
            let not_done = self.dones[t].affine(-1.0, 1.0)?;
            let bootstrap = (next_values * &not_done)?.affine(gamma, 0.0)?;
            let delta = ((&self.rewards[t] + bootstrap)? - &self.values[t])?;
            let advantage = (&delta + (&next_advantage * &not_done)?.affine(gamma * lambda, 0.0)?)?;
            returns[t] = Some((&advantage + &self.values[t])?);
            advantages[t] = Some(advantage.clone());
            next_advantage = advantage;
        }
        let mut advantages: Vec<Tensor> = advantages.into_iter().flatten().collect();
        let mut returns: Vec<Tensor> = returns.into_iter().flatten().collect();

        if params.normalize_advantages {
            normalize(&mut advantages)?;
        }
        if params.normalize_returns {
            normalize(&mut returns)?;
        }
        self.advantages = advantages;
        self.returns = returns;
        Ok(())
    }

    /// The entire window as one flat batch. Pure read: calling it repeatedly
    /// without intervening mutation yields identical tensors.
    pub fn sample_all(&self) -> Result<RolloutSample> {
        ensure!(
            self.returns.len() == self.states.len() && !self.states.is_empty(),
            "returns/advantages have not been computed for the current window"
        );
        Ok(RolloutSample {
            states: Tensor::cat(&self.states, 0)?,
            actions: Tensor::cat(&self.actions, 0)?,
            log_prob: Tensor::cat(&self.log_prob, 0)?,
            values: Tensor::cat(&self.values, 0)?,
            returns: Tensor::cat(&self.returns, 0)?,
            advantages: Tensor::cat(&self.advantages, 0)?,
        })
    }
}

/// Shift to zero mean and unit variance across the whole window.
fn normalize(tensors: &mut [Tensor]) -> Result<()> {
    let stacked = Tensor::stack(tensors, 0)?;
    let mean = stacked.mean_all()?.to_scalar::<f32>()? as f64;
    let std = stacked
        .affine(1.0, -mean)?
        .sqr()?
        .mean_all()?
        .to_scalar::<f32>()?
        .sqrt() as f64;
    let scale = 1.0 / (std + 1e-8);
    for tensor in tensors.iter_mut() {
        *tensor = tensor.affine(scale, -mean * scale)?;
    }
    Ok(())
}

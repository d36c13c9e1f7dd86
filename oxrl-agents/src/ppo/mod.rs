pub mod builder;
pub mod functions;

pub use builder::PpoBuilder;

use crate::ppo::functions::{approximate_kl, clipped_surrogate, clipped_value_loss};
use anyhow::{Context, Result};
use candle_core::Tensor;
use candle_nn::VarMap;
use oxrl_core::{
    agent::Agent,
    config::PpoConfig,
    memory::{GaeParams, TransitionBatch},
    metrics::ScalarWriter,
    models::{PolicyModel, ValueModel},
    tensors::{EntropyLoss, PolicyLoss, ValueLoss},
};
use oxrl_candle::{optimizer::OptimizerWithMaxGrad, rollout_memory::RolloutMemory};
use tracing::info;

/// Proximal Policy Optimization.
///
/// https://arxiv.org/abs/1707.06347
///
/// Both networks are typed constructor parameters, so a missing policy or value
/// binding cannot survive past construction. The configuration is frozen at
/// construction time and the rollout window is sized exactly to the update cadence.
pub struct Ppo<P: PolicyModel, V: ValueModel> {
    policy: P,
    value: V,
    memory: RolloutMemory,
    policy_optimizer: OptimizerWithMaxGrad,
    value_optimizer: OptimizerWithMaxGrad,
    writer: Box<dyn ScalarWriter>,
    cfg: PpoConfig,
    entropy_bonus: Option<f32>,
    kl_stop: Option<f32>,
    warmed_up: bool,
    rollout: usize,
    current_log_prob: Option<Tensor>,
    current_next_states: Option<Tensor>,
}

impl<P: PolicyModel, V: ValueModel> Ppo<P, V> {
    pub fn new(
        policy: P,
        policy_varmap: VarMap,
        value: V,
        value_varmap: VarMap,
        num_envs: usize,
        writer: Box<dyn ScalarWriter>,
        cfg: PpoConfig,
    ) -> Result<Self> {
        cfg.validate()?;
        let memory = RolloutMemory::new(cfg.rollouts, num_envs)?;
        let policy_optimizer =
            OptimizerWithMaxGrad::new(policy_varmap, cfg.policy_learning_rate, cfg.max_grad_norm)?;
        let value_optimizer =
            OptimizerWithMaxGrad::new(value_varmap, cfg.value_learning_rate, cfg.max_grad_norm)?;
        let entropy_bonus = cfg.entropy_bonus();
        let kl_stop = cfg.kl_stop();
        let warmed_up = cfg.random_timesteps == 0;
        Ok(Self {
            policy,
            value,
            memory,
            policy_optimizer,
            value_optimizer,
            writer,
            cfg,
            entropy_bonus,
            kl_stop,
            warmed_up,
            rollout: 0,
            current_log_prob: None,
            current_next_states: None,
        })
    }

    pub fn config(&self) -> &PpoConfig {
        &self.cfg
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn memory(&self) -> &RolloutMemory {
        &self.memory
    }

    /// One optimization cycle over the collected window. The step order is
    /// load-bearing: bootstrap, then returns/advantages, then the full-batch
    /// sample, then the epochs. Advantages depend on a fresh bootstrap and every
    /// epoch reuses the same precomputed snapshot.
    fn update(&mut self, timestep: usize) -> Result<()> {
        let next_states = self
            .current_next_states
            .as_ref()
            .context("update ran before any transition was recorded")?;
        let last_values = self.value.value(next_states)?.detach();
        self.memory.compute_returns_and_advantages(
            &last_values,
            &GaeParams {
                discount_factor: self.cfg.discount_factor,
                lambda_coefficient: self.cfg.lambda,
                normalize_returns: false,
                normalize_advantages: true,
            },
        )?;
        let sample = self.memory.sample_all()?;

        let mut cumulative_policy_loss = 0f32;
        let mut cumulative_value_loss = 0f32;
        let mut cumulative_entropy_loss = 0f32;
        let mut epochs_run = 0usize;

        for epoch in 0..self.cfg.learning_epochs {
            // the updated policy's probability of the *old* actions
            let next_log_prob = self.policy.log_prob(&sample.states, &sample.actions)?;
            let log_ratio = (&next_log_prob - &sample.log_prob)?;

            if let Some(threshold) = self.kl_stop {
                let kl = approximate_kl(&log_ratio)?;
                if kl > threshold {
                    info!(
                        epoch,
                        kl, threshold, "kl divergence above threshold, stopping the update early"
                    );
                    break;
                }
            }

            let entropy_loss = match self.entropy_bonus {
                Some(scale) => Some(EntropyLoss(
                    (self.policy.entropy()?.mean_all()? * -(scale as f64))?,
                )),
                None => None,
            };

            let policy_loss = PolicyLoss(clipped_surrogate(
                &sample.advantages,
                &log_ratio,
                self.cfg.ratio_clip,
            )?);
            let policy_objective = match &entropy_loss {
                Some(entropy_loss) => (&policy_loss.0 + &entropy_loss.0)?,
                None => policy_loss.0.clone(),
            };
            self.policy_optimizer.backward_step(&policy_objective)?;

            // the value step runs on its own graph and optimizer state
            let predicted_values = self.value.value(&sample.states)?;
            let value_clip = self.cfg.clip_predicted_values.then_some(self.cfg.value_clip);
            let value_loss = ValueLoss(clipped_value_loss(
                &sample.returns,
                &predicted_values,
                &sample.values,
                value_clip,
                self.cfg.value_loss_scale,
            )?);
            self.value_optimizer.backward_step(&value_loss)?;

            cumulative_policy_loss += policy_loss.to_scalar::<f32>()?;
            cumulative_value_loss += value_loss.to_scalar::<f32>()?;
            if let Some(entropy_loss) = &entropy_loss {
                cumulative_entropy_loss += entropy_loss.to_scalar::<f32>()?;
            }
            epochs_run += 1;
        }

        // a kl trip in the first epoch means no optimizer step ran and there is
        // nothing truthful to report
        if epochs_run == 0 {
            return Ok(());
        }
        let epochs = epochs_run as f32;
        self.writer
            .add_scalar("Loss/policy", cumulative_policy_loss / epochs, timestep);
        self.writer
            .add_scalar("Loss/value", cumulative_value_loss / epochs, timestep);
        if self.entropy_bonus.is_some() {
            self.writer
                .add_scalar("Loss/entropy", cumulative_entropy_loss / epochs, timestep);
        }
        Ok(())
    }
}

impl<P: PolicyModel, V: ValueModel> Agent for Ppo<P, V> {
    fn act(&mut self, states: &Tensor, timestep: usize) -> Result<Tensor> {
        // pure exploration warmup, the trained policy is bypassed entirely
        if timestep < self.cfg.random_timesteps {
            return self.policy.random_act(states);
        }
        if !self.warmed_up {
            // the exploration rows carry placeholder log-probs; drop them and
            // restart the cadence so every optimized window is entirely on-policy
            self.memory.clear();
            self.rollout = 0;
            self.warmed_up = true;
        }
        let (actions, log_prob, _mean_actions) = self.policy.act(states)?;
        self.current_log_prob = Some(log_prob);
        Ok(actions)
    }

    fn record_transition(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        rewards: &Tensor,
        next_states: &Tensor,
        dones: &Tensor,
        _timestep: usize,
    ) -> Result<()> {
        // values must correspond to the state the action was taken from
        let values = self.value.value(states)?.detach();
        let log_prob = match &self.current_log_prob {
            Some(log_prob) => log_prob.clone(),
            // random-warmup steps carry no policy log-probability; these rows are
            // dropped when the warmup ends and never reach an update
            None => Tensor::zeros_like(rewards)?,
        };
        self.current_next_states = Some(next_states.clone());
        self.memory.add_samples(TransitionBatch {
            states: states.clone(),
            actions: actions.clone(),
            rewards: rewards.clone(),
            dones: dones.clone(),
            log_prob,
            values,
        })
    }

    fn post_interaction(&mut self, timestep: usize) -> Result<()> {
        self.rollout += 1;
        // enough data collected and warmup satisfied are independent gates
        if self.rollout % self.cfg.rollouts == 0 && timestep >= self.cfg.learning_starts {
            self.update(timestep)?;
        }
        Ok(())
    }
}

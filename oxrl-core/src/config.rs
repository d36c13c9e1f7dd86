use anyhow::{Result, ensure};
use candle_core::Device;

/// PPO hyperparameters. One frozen snapshot per agent: construct it with struct
/// update syntax over `Default::default()` and hand it to the agent, which keeps its
/// own copy. There is no process wide mutable default to share.
#[derive(Debug, Clone)]
pub struct PpoConfig {
    /// Number of environment timesteps collected between updates.
    pub rollouts: usize,
    /// Maximum optimization passes over the window per update.
    pub learning_epochs: usize,
    /// Discount factor (gamma).
    pub discount_factor: f32,
    /// TD(lambda) coefficient for the advantage recursion.
    pub lambda: f32,
    pub policy_learning_rate: f64,
    pub value_learning_rate: f64,
    /// Timesteps of pure random exploration before the trained policy is consulted.
    pub random_timesteps: usize,
    /// Updates are suppressed until this many timesteps have elapsed.
    pub learning_starts: usize,
    /// Clipping coefficient of the surrogate objective.
    pub ratio_clip: f32,
    /// Clipping coefficient of the value loss, used when `clip_predicted_values` is set.
    pub value_clip: f32,
    pub clip_predicted_values: bool,
    /// Entropy bonus scale; 0 disables the bonus entirely.
    pub entropy_loss_scale: f32,
    pub value_loss_scale: f32,
    /// Approximate KL divergence above which the epoch loop stops early; 0 disables
    /// the check.
    pub kl_threshold: f32,
    /// Global gradient norm clip applied by both optimizers.
    pub max_grad_norm: Option<f32>,
    pub device: Device,
}

impl Default for PpoConfig {
    fn default() -> Self {
        Self {
            rollouts: 16,
            learning_epochs: 8,
            discount_factor: 0.99,
            lambda: 0.99,
            policy_learning_rate: 1e-3,
            value_learning_rate: 1e-3,
            random_timesteps: 1000,
            learning_starts: 1000,
            ratio_clip: 0.2,
            value_clip: 0.2,
            clip_predicted_values: false,
            entropy_loss_scale: 0.0,
            value_loss_scale: 1.0,
            kl_threshold: 0.0,
            max_grad_norm: None,
            device: Device::Cpu,
        }
    }
}

impl PpoConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.rollouts > 0, "rollouts must be at least 1");
        ensure!(self.learning_epochs > 0, "learning_epochs must be at least 1");
        ensure!(
            self.learning_starts >= self.random_timesteps,
            "learning_starts ({}) must cover the random exploration phase ({}); \
             transitions collected during warmup carry no policy log-probability",
            self.learning_starts,
            self.random_timesteps
        );
        Ok(())
    }

    /// Entropy bonus scale, `None` when the bonus is disabled. The loss term is
    /// skipped entirely rather than computed with a zero factor.
    pub fn entropy_bonus(&self) -> Option<f32> {
        (self.entropy_loss_scale != 0.0).then_some(self.entropy_loss_scale)
    }

    /// KL early stop threshold, `None` when disabled.
    pub fn kl_stop(&self) -> Option<f32> {
        (self.kl_threshold > 0.0).then_some(self.kl_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scales_disable_optional_terms() {
        let cfg = PpoConfig::default();
        assert!(cfg.entropy_bonus().is_none());
        assert!(cfg.kl_stop().is_none());
        let cfg = PpoConfig {
            entropy_loss_scale: 0.01,
            kl_threshold: 0.03,
            ..Default::default()
        };
        assert_eq!(cfg.entropy_bonus(), Some(0.01));
        assert_eq!(cfg.kl_stop(), Some(0.03));
    }

    #[test]
    fn warmup_shorter_than_learning_starts_is_rejected() {
        let cfg = PpoConfig {
            random_timesteps: 100,
            learning_starts: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}

use crate::sequential::{Sequential, build_sequential};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{Init, Module, VarBuilder};
use oxrl_core::{models::PolicyModel, rng::RNG};
use rand::Rng;
use std::f32;

/// Gaussian policy with a state-dependent mean and a learned, state-independent
/// diagonal log standard deviation.
#[derive(Debug, Clone)]
pub struct DiagGaussianPolicy {
    mu_net: Sequential,
    log_std: Tensor,
    action_dim: usize,
    action_low: f32,
    action_high: f32,
}

impl DiagGaussianPolicy {
    pub fn build(
        observation_dim: usize,
        action_dim: usize,
        hidden_layers: &[usize],
        vb: &VarBuilder,
        action_bounds: (f32, f32),
    ) -> Result<Self> {
        let mut layers = hidden_layers.to_vec();
        layers.push(action_dim);
        let mu_net = build_sequential(observation_dim, &layers, vb, "policy")?;
        let log_std = vb.get_with_hints(action_dim, "log_std", Init::Const(0.0))?;
        Ok(Self {
            mu_net,
            log_std,
            action_dim,
            action_low: action_bounds.0,
            action_high: action_bounds.1,
        })
    }

    fn gaussian_log_prob(&self, mu: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let std = self.log_std.exp()?.broadcast_as(mu.shape())?;
        let var = std.sqr()?;
        let log_sqrt_2pi = f32::ln(f32::sqrt(2.0 * f32::consts::PI));
        let squared_distance = ((actions - mu)?.sqr()? / var.affine(2.0, 0.0)?)?;
        let log_probs = ((squared_distance.neg()? - self.log_std.broadcast_as(mu.shape())?)?
            .affine(1.0, -(log_sqrt_2pi as f64))?)
        .sum(1)?;
        Ok(log_probs)
    }
}

impl PolicyModel for DiagGaussianPolicy {
    fn act(&self, states: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let mu = self.mu_net.forward(states)?;
        let std = self.log_std.exp()?.broadcast_as(mu.shape())?;
        let noise = Tensor::randn(0f32, 1.0, mu.shape(), mu.device())?;
        let actions = (&mu + (std * noise)?)?.detach();
        let log_prob = self.gaussian_log_prob(&mu, &actions)?.detach();
        Ok((actions, log_prob, mu.detach()))
    }

    fn log_prob(&self, states: &Tensor, taken_actions: &Tensor) -> Result<Tensor> {
        let mu = self.mu_net.forward(states)?;
        self.gaussian_log_prob(&mu, taken_actions)
    }

    fn random_act(&self, states: &Tensor) -> Result<Tensor> {
        let batch = states.dim(0)?;
        let samples = RNG.with_borrow_mut(|rng| {
            (0..batch * self.action_dim)
                .map(|_| rng.random_range(self.action_low..self.action_high))
                .collect::<Vec<f32>>()
        });
        Ok(Tensor::from_vec(
            samples,
            (batch, self.action_dim),
            states.device(),
        )?)
    }

    fn entropy(&self) -> Result<Tensor> {
        let half_log_2pi_plus_1 = Tensor::full(
            0.5 * ((2.0 * f32::consts::PI).ln() + 1.0),
            self.log_std.shape(),
            self.log_std.device(),
        )?;
        Ok(half_log_2pi_plus_1.add(&self.log_std)?.sum_all()?)
    }
}

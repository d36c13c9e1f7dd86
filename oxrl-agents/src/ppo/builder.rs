use crate::ppo::Ppo;
use anyhow::Result;
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use oxrl_core::{config::PpoConfig, env::EnvDescription, metrics::ScalarWriter};
use oxrl_candle::{policy::DiagGaussianPolicy, value::ValueNet};

/// Builds a PPO agent with the default candle networks: a diagonal Gaussian policy
/// and a feed forward value net, each with its own varmap and optimizer.
pub struct PpoBuilder {
    pub policy_hidden_layers: Vec<usize>,
    pub value_hidden_layers: Vec<usize>,
    pub action_bounds: (f32, f32),
    pub cfg: PpoConfig,
}

impl Default for PpoBuilder {
    fn default() -> Self {
        Self {
            policy_hidden_layers: vec![64, 64],
            value_hidden_layers: vec![64, 64],
            action_bounds: (-1.0, 1.0),
            cfg: PpoConfig::default(),
        }
    }
}

impl PpoBuilder {
    pub fn build(
        &self,
        env: &EnvDescription,
        writer: Box<dyn ScalarWriter>,
    ) -> Result<Ppo<DiagGaussianPolicy, ValueNet>> {
        let device = self.cfg.device.clone();

        let policy_varmap = VarMap::new();
        let policy_vb = VarBuilder::from_varmap(&policy_varmap, DType::F32, &device);
        let policy = DiagGaussianPolicy::build(
            env.observation_dim,
            env.action_dim,
            &self.policy_hidden_layers,
            &policy_vb,
            self.action_bounds,
        )?;

        let value_varmap = VarMap::new();
        let value_vb = VarBuilder::from_varmap(&value_varmap, DType::F32, &device);
        let value = ValueNet::build(env.observation_dim, &self.value_hidden_layers, &value_vb)?;

        Ppo::new(
            policy,
            policy_varmap,
            value,
            value_varmap,
            env.num_envs,
            writer,
            self.cfg.clone(),
        )
    }
}

use crate::sequential::{Sequential, build_sequential};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{Module, VarBuilder};
use oxrl_core::models::ValueModel;

/// Feed forward state-value estimator.
#[derive(Debug, Clone)]
pub struct ValueNet {
    net: Sequential,
}

impl ValueNet {
    pub fn build(observation_dim: usize, hidden_layers: &[usize], vb: &VarBuilder) -> Result<Self> {
        let mut layers = hidden_layers.to_vec();
        layers.push(1);
        let net = build_sequential(observation_dim, &layers, vb, "value")?;
        Ok(Self { net })
    }
}

impl ValueModel for ValueNet {
    fn value(&self, states: &Tensor) -> Result<Tensor> {
        Ok(self.net.forward(states)?.squeeze(1)?)
    }
}

use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{Activation, Linear, Module, VarBuilder, linear};

#[derive(Debug, Clone)]
enum Layer {
    Linear(Linear),
    Activation(Activation),
}

impl Module for Layer {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Layer::Linear(linear) => linear.forward(xs),
            Layer::Activation(activation) => activation.forward(xs),
        }
    }
}

/// Plain feed forward net: linear layers with an activation between each pair, none
/// after the last.
#[derive(Debug, Clone, Default)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Module for Sequential {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let mut xs = xs.clone();
        for layer in self.layers.iter() {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }
}

/// `layers` lists every output dimension including the final one, so
/// `build_sequential(4, &[64, 64, 2], ..)` is a 4 -> 64 -> 64 -> 2 net.
pub fn build_sequential(
    input_dim: usize,
    layers: &[usize],
    vb: &VarBuilder,
    prefix: &str,
) -> Result<Sequential> {
    let mut nn = Sequential::default();
    let mut last_dim = input_dim;
    for (layer_idx, &layer_size) in layers.iter().enumerate() {
        let name = format!("{prefix}{layer_idx}");
        nn.layers
            .push(Layer::Linear(linear(last_dim, layer_size, vb.pp(name))?));
        if layer_idx + 1 < layers.len() {
            nn.layers.push(Layer::Activation(Activation::Relu));
        }
        last_dim = layer_size;
    }
    Ok(nn)
}

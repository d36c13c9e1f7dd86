use anyhow::Result;
use candle_core::{Tensor, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use std::fmt::Debug;

/// AdamW over every variable of a varmap, with an optional global gradient norm
/// clip applied between backward and step.
pub struct OptimizerWithMaxGrad {
    pub optimizer: AdamW,
    pub max_grad_norm: Option<f32>,
    pub varmap: VarMap,
}

impl Debug for OptimizerWithMaxGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("max_grad_norm", &self.max_grad_norm)
            .finish()
    }
}

impl OptimizerWithMaxGrad {
    pub fn new(varmap: VarMap, learning_rate: f64, max_grad_norm: Option<f32>) -> Result<Self> {
        let optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: learning_rate,
                ..Default::default()
            },
        )?;
        Ok(Self {
            optimizer,
            max_grad_norm,
            varmap,
        })
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    /// One backward pass and one optimizer step. Every call starts from a fresh
    /// gradient store, so gradients never accumulate across steps.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = match self.max_grad_norm {
            Some(max_norm) => self.clipped_grads(loss, max_norm)?,
            None => loss.backward()?,
        };
        self.optimizer.step(&grads)?;
        Ok(())
    }

    fn clipped_grads(&self, loss: &Tensor, max_norm: f32) -> Result<GradStore> {
        let mut grads = loss.backward()?;
        let vars = self.varmap.all_vars();
        let mut total_norm_squared = 0f32;
        for var in vars.iter() {
            if let Some(grad) = grads.get_id(var.id()) {
                total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
            }
        }
        let total_norm = total_norm_squared.sqrt();
        if total_norm > max_norm {
            let clip_coef = max_norm / (total_norm + 1e-6);
            for var in vars.iter() {
                let Some(grad) = grads.get_id(var.id()).cloned() else {
                    continue;
                };
                let clipped = grad.affine(clip_coef as f64, 0.0)?;
                grads.insert(var.as_tensor(), clipped);
            }
        }
        Ok(grads)
    }
}

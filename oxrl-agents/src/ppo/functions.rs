use anyhow::Result;
use candle_core::Tensor;

/// Clipped surrogate objective:
/// `-mean(min(A * ratio, A * clamp(ratio, 1 - eps, 1 + eps)))` with
/// `ratio = exp(log_ratio)`.
pub fn clipped_surrogate(
    advantages: &Tensor,
    log_ratio: &Tensor,
    ratio_clip: f32,
) -> Result<Tensor> {
    let ratio = log_ratio.exp()?;
    let surrogate = (advantages * &ratio)?;
    let surrogate_clipped = (advantages * ratio.clamp(1.0 - ratio_clip, 1.0 + ratio_clip)?)?;
    Ok(Tensor::minimum(&surrogate, &surrogate_clipped)?
        .neg()?
        .mean_all()?)
}

/// `mean((exp(d) - 1) - d)` for `d = new_log_prob - old_log_prob`. A cheap
/// estimator of the KL divergence between the data-collecting policy and the
/// current one; always evaluated on a detached graph.
pub fn approximate_kl(log_ratio: &Tensor) -> Result<f32> {
    let log_ratio = log_ratio.detach();
    let kl = (log_ratio.exp()?.affine(1.0, -1.0)? - &log_ratio)?;
    Ok(kl.mean_all()?.to_scalar::<f32>()?)
}

/// Scaled squared error against the returns. With `value_clip` set, predictions
/// are first pulled back to within the clip range of the values recorded at
/// collection time, which bounds how far a single update can move the value
/// function.
pub fn clipped_value_loss(
    returns: &Tensor,
    predicted_values: &Tensor,
    sampled_values: &Tensor,
    value_clip: Option<f32>,
    value_loss_scale: f32,
) -> Result<Tensor> {
    let predicted_values = match value_clip {
        Some(clip) => (sampled_values + (predicted_values - sampled_values)?.clamp(-clip, clip)?)?,
        None => predicted_values.clone(),
    };
    Ok((returns - predicted_values)?
        .sqr()?
        .mean_all()?
        .affine(value_loss_scale as f64, 0.0)?)
}

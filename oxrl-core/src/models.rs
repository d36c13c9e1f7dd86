use anyhow::Result;
use candle_core::Tensor;

/// Capability set of a stochastic policy. Implementations return detached tensors
/// from the interaction-time methods (`act`, `random_act`); only `log_prob` and
/// `entropy` keep the gradient graph alive, since those feed the losses.
pub trait PolicyModel {
    /// Sample actions for a batch of states. Returns
    /// `(actions, log_prob, mean_actions)`.
    fn act(&self, states: &Tensor) -> Result<(Tensor, Tensor, Tensor)>;

    /// Log-probability of already-taken actions under the current parameters. This
    /// is the replay side of the importance ratio: the actions are held fixed, only
    /// the parameters have moved.
    fn log_prob(&self, states: &Tensor, taken_actions: &Tensor) -> Result<Tensor>;

    /// Unconstrained exploration actions drawn from the action space, ignoring the
    /// trained parameters.
    fn random_act(&self, states: &Tensor) -> Result<Tensor>;

    /// Entropy of the current action distribution.
    fn entropy(&self) -> Result<Tensor>;
}

/// Scalar state-value estimator.
pub trait ValueModel {
    /// Value estimate per state, shape `(batch,)`.
    fn value(&self, states: &Tensor) -> Result<Tensor>;
}

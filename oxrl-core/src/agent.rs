use anyhow::Result;
use candle_core::Tensor;

/// Interaction surface of an agent. The driver must call, for every timestep and in
/// this order: `pre_interaction`, `act`, `record_transition`, `post_interaction`.
/// The ordering is load-bearing: `act` caches the log-probability that
/// `record_transition` stores alongside the action, and `post_interaction` is where
/// learning may run.
pub trait Agent {
    /// Choose actions for a batch of states.
    fn act(&mut self, states: &Tensor, timestep: usize) -> Result<Tensor>;

    /// Record one environment transition. Must run exactly once per timestep,
    /// after `act`.
    fn record_transition(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        rewards: &Tensor,
        next_states: &Tensor,
        dones: &Tensor,
        timestep: usize,
    ) -> Result<()>;

    /// Callback before the environment interaction.
    fn pre_interaction(&mut self, _timestep: usize) -> Result<()> {
        Ok(())
    }

    /// Callback after the environment interaction; learning cadence lives here.
    fn post_interaction(&mut self, timestep: usize) -> Result<()>;
}

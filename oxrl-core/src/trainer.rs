use crate::{Algorithm, agent::Agent, env::Env};
use anyhow::Result;
use candle_core::DType;
use tracing::info;

/// Single-threaded training driver: one `act -> step -> record -> post_interaction`
/// cycle per timestep, fully synchronous. The agent decides on its own cadence when
/// to learn inside `post_interaction`.
pub struct SequentialTrainer<E: Env, A: Agent> {
    pub env: E,
    pub agent: A,
    /// Total environment timesteps to run.
    pub timesteps: usize,
    /// Progress is reported every this many timesteps; 0 disables reporting.
    pub log_interval: usize,
}

impl<E: Env, A: Agent> SequentialTrainer<E, A> {
    pub fn new(env: E, agent: A, timesteps: usize) -> Self {
        Self {
            env,
            agent,
            timesteps,
            log_interval: 1000,
        }
    }
}

impl<E: Env, A: Agent> Algorithm for SequentialTrainer<E, A> {
    fn train(&mut self) -> Result<()> {
        let mut states = self.env.reset()?;
        let mut total_reward = 0f32;
        let mut episodes = 0usize;
        for timestep in 0..self.timesteps {
            self.agent.pre_interaction(timestep)?;
            let actions = self.agent.act(&states, timestep)?;
            let (next_states, rewards, dones) = self.env.step(&actions)?;
            self.agent
                .record_transition(&states, &actions, &rewards, &next_states, &dones, timestep)?;
            self.agent.post_interaction(timestep)?;

            total_reward += rewards.sum_all()?.to_scalar::<f32>()?;
            episodes += dones.to_dtype(DType::F32)?.sum_all()?.to_scalar::<f32>()? as usize;
            if self.log_interval > 0 && (timestep + 1) % self.log_interval == 0 {
                info!(timestep, episodes, total_reward, "training progress");
                total_reward = 0.0;
                episodes = 0;
            }

            states = next_states;
        }
        Ok(())
    }
}

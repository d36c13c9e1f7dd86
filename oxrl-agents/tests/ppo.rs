use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use oxrl_agents::Ppo;
use oxrl_core::{
    agent::Agent,
    config::PpoConfig,
    metrics::ScalarWriter,
    models::{PolicyModel, ValueModel},
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Deterministic policy stub: stochastic actions and log-probs are all zero, random
/// actions are all sevens, and replayed log-probs follow a scripted sequence.
struct ScriptedPolicy {
    act_calls: Cell<usize>,
    log_prob_calls: Cell<usize>,
    /// Log-prob reported for actions sampled through `act`.
    act_log_prob: f32,
    /// Value returned by the n-th `log_prob` call; the last entry repeats.
    log_prob_script: Vec<f32>,
}

impl ScriptedPolicy {
    fn flat(script: Vec<f32>) -> Self {
        Self {
            act_calls: Cell::new(0),
            log_prob_calls: Cell::new(0),
            act_log_prob: 0.0,
            log_prob_script: script,
        }
    }
}

impl PolicyModel for ScriptedPolicy {
    fn act(&self, states: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        self.act_calls.set(self.act_calls.get() + 1);
        let batch = states.dim(0)?;
        let actions = Tensor::zeros((batch, 1), DType::F32, states.device())?;
        let log_prob = Tensor::full(self.act_log_prob, batch, states.device())?;
        Ok((actions.clone(), log_prob, actions))
    }

    fn log_prob(&self, states: &Tensor, _taken_actions: &Tensor) -> Result<Tensor> {
        let call = self.log_prob_calls.get();
        self.log_prob_calls.set(call + 1);
        let value = *self
            .log_prob_script
            .get(call)
            .or(self.log_prob_script.last())
            .unwrap_or(&0.0);
        let batch = states.dim(0)?;
        Ok(Tensor::full(value, batch, states.device())?)
    }

    fn random_act(&self, states: &Tensor) -> Result<Tensor> {
        let batch = states.dim(0)?;
        Ok(Tensor::full(7f32, (batch, 1), states.device())?)
    }

    fn entropy(&self) -> Result<Tensor> {
        Ok(Tensor::zeros((), DType::F32, &Device::Cpu)?)
    }
}

/// Value stub pinned to 1.0.
struct UnitValue;

impl ValueModel for UnitValue {
    fn value(&self, states: &Tensor) -> Result<Tensor> {
        let batch = states.dim(0)?;
        Ok(Tensor::ones(batch, DType::F32, states.device())?)
    }
}

type Records = Rc<RefCell<Vec<(String, f32, usize)>>>;

#[derive(Clone)]
struct RecordingWriter {
    records: Records,
}

impl RecordingWriter {
    fn new() -> Self {
        Self {
            records: Rc::new(RefCell::new(vec![])),
        }
    }

    fn tagged(&self, tag: &str) -> Vec<(f32, usize)> {
        self.records
            .borrow()
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, value, step)| (*value, *step))
            .collect()
    }
}

impl ScalarWriter for RecordingWriter {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) {
        self.records.borrow_mut().push((tag.to_owned(), value, step));
    }
}

fn scripted_agent(
    policy: ScriptedPolicy,
    cfg: PpoConfig,
) -> Result<(Ppo<ScriptedPolicy, UnitValue>, RecordingWriter)> {
    let writer = RecordingWriter::new();
    let agent = Ppo::new(
        policy,
        VarMap::new(),
        UnitValue,
        VarMap::new(),
        1,
        Box::new(writer.clone()),
        cfg,
    )?;
    Ok((agent, writer))
}

fn drive_step(
    agent: &mut Ppo<ScriptedPolicy, UnitValue>,
    timestep: usize,
    reward: f32,
    done: bool,
) -> Result<()> {
    let device = Device::Cpu;
    let states = Tensor::full(timestep as f32, (1, 2), &device)?;
    let actions = agent.act(&states, timestep)?;
    let next_states = Tensor::full(timestep as f32 + 1.0, (1, 2), &device)?;
    let rewards = Tensor::full(reward, 1, &device)?;
    let dones = Tensor::full(if done { 1f32 } else { 0f32 }, 1, &device)?;
    agent.record_transition(&states, &actions, &rewards, &next_states, &dones, timestep)?;
    agent.post_interaction(timestep)
}

#[test]
fn update_runs_once_per_window_with_bootstrapped_returns() -> Result<()> {
    let cfg = PpoConfig {
        rollouts: 4,
        learning_epochs: 2,
        discount_factor: 0.99,
        lambda: 0.95,
        random_timesteps: 0,
        learning_starts: 0,
        ..Default::default()
    };
    let (mut agent, writer) = scripted_agent(ScriptedPolicy::flat(vec![0.0]), cfg)?;

    for timestep in 0..4 {
        drive_step(&mut agent, timestep, 1.0, timestep == 3)?;
    }

    // exactly one update, reported at the fourth timestep
    let value_records = writer.tagged("Loss/value");
    assert_eq!(value_records.len(), 1);
    assert_eq!(value_records[0].1, 3);
    assert_eq!(writer.tagged("Loss/policy").len(), 1);
    // entropy bonus is disabled, so nothing must be reported for it
    assert!(writer.tagged("Loss/entropy").is_empty());

    // terminal step has no bootstrap; earlier steps follow the GAE recursion with
    // values pinned to 1.0 and bootstrap 1.0
    let returns = agent.memory().sample_all()?.returns.to_vec1::<f32>()?;
    let expected = [3.7967899f32, 2.921095, 1.921095, 1.0];
    for (actual, expected) in returns.iter().zip(expected) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "return {actual} != {expected}"
        );
    }
    Ok(())
}

#[test]
fn warmup_timesteps_use_the_random_action_path() -> Result<()> {
    let cfg = PpoConfig {
        rollouts: 8,
        random_timesteps: 2,
        learning_starts: 2,
        ..Default::default()
    };
    let (mut agent, _writer) = scripted_agent(ScriptedPolicy::flat(vec![0.0]), cfg)?;

    let states = Tensor::zeros((1, 2), DType::F32, &Device::Cpu)?;
    let actions = agent.act(&states, 0)?;
    assert_eq!(actions.flatten_all()?.to_vec1::<f32>()?, vec![7.0]);
    // recording during warmup must work even though no log-prob was cached
    let rewards = Tensor::zeros(1, DType::F32, &Device::Cpu)?;
    let dones = Tensor::zeros(1, DType::F32, &Device::Cpu)?;
    agent.record_transition(&states, &actions, &rewards, &states, &dones, 0)?;
    agent.post_interaction(0)?;

    // past the threshold the trained policy takes over
    let actions = agent.act(&states, 2)?;
    assert_eq!(actions.flatten_all()?.to_vec1::<f32>()?, vec![0.0]);
    Ok(())
}

#[test]
fn kl_divergence_stops_the_epoch_loop_early() -> Result<()> {
    let cfg = PpoConfig {
        rollouts: 2,
        learning_epochs: 8,
        discount_factor: 0.99,
        lambda: 0.95,
        random_timesteps: 0,
        learning_starts: 0,
        kl_threshold: 0.5,
        ..Default::default()
    };
    // first epoch replays the collected log-probs exactly, the second has diverged
    let policy = ScriptedPolicy::flat(vec![0.0, 10.0]);
    let (mut agent, writer) = scripted_agent(policy, cfg)?;

    drive_step(&mut agent, 0, 1.0, false)?;
    drive_step(&mut agent, 1, 1.0, false)?;

    // the loop ran epoch 0, then aborted in epoch 1 before stepping
    assert_eq!(agent.memory().len(), 2);
    let value_records = writer.tagged("Loss/value");
    assert_eq!(value_records.len(), 1);
    // the mean divides by the single executed epoch:
    // returns = [2.921095, 1.99], values = 1.0
    let expected = ((2.921095f32 - 1.0).powi(2) + (1.99f32 - 1.0).powi(2)) / 2.0;
    assert!(
        (value_records[0].0 - expected).abs() < 1e-4,
        "value loss {} != {expected}",
        value_records[0].0
    );
    // normalized advantages have zero mean, so the unclipped first-epoch policy
    // loss is ~0
    let policy_records = writer.tagged("Loss/policy");
    assert!(policy_records[0].0.abs() < 1e-4);
    Ok(())
}

#[test]
fn kl_early_stop_runs_one_policy_evaluation_per_epoch() -> Result<()> {
    let cfg = PpoConfig {
        rollouts: 2,
        learning_epochs: 8,
        random_timesteps: 0,
        learning_starts: 0,
        kl_threshold: 0.5,
        ..Default::default()
    };
    let policy = ScriptedPolicy::flat(vec![0.0, 10.0]);
    let (mut agent, _writer) = scripted_agent(policy, cfg)?;
    drive_step(&mut agent, 0, 1.0, false)?;
    drive_step(&mut agent, 1, 1.0, false)?;
    // epoch 0 passed the check, epoch 1 tripped it: two evaluations, not eight
    assert_eq!(agent.policy().log_prob_calls.get(), 2);
    Ok(())
}

#[test]
fn warmup_rows_are_dropped_before_the_first_update() -> Result<()> {
    // a warmup length that is not a multiple of the window size: without the
    // purge, the first update's window would still hold the exploration row with
    // its placeholder log-prob
    let cfg = PpoConfig {
        rollouts: 2,
        learning_epochs: 1,
        random_timesteps: 1,
        learning_starts: 1,
        ..Default::default()
    };
    let mut policy = ScriptedPolicy::flat(vec![5.0]);
    policy.act_log_prob = 5.0;
    let (mut agent, writer) = scripted_agent(policy, cfg)?;

    drive_step(&mut agent, 0, 1.0, false)?;
    drive_step(&mut agent, 1, 1.0, false)?;
    drive_step(&mut agent, 2, 1.0, false)?;

    // the optimized window holds only on-policy rows, no zero placeholders
    assert_eq!(agent.memory().len(), 2);
    let log_prob = agent.memory().sample_all()?.log_prob.to_vec1::<f32>()?;
    assert_eq!(log_prob, vec![5.0, 5.0]);

    // the cadence restarted when the warmup ended, so the single update ran at
    // the second post-warmup timestep
    let value_records = writer.tagged("Loss/value");
    assert_eq!(value_records.len(), 1);
    assert_eq!(value_records[0].1, 2);
    Ok(())
}

#[test]
fn kl_trip_in_the_first_epoch_reports_no_losses() -> Result<()> {
    let cfg = PpoConfig {
        rollouts: 2,
        learning_epochs: 8,
        random_timesteps: 0,
        learning_starts: 0,
        kl_threshold: 0.5,
        ..Default::default()
    };
    // already diverged in the first epoch, before any optimizer step
    let policy = ScriptedPolicy::flat(vec![10.0]);
    let (mut agent, writer) = scripted_agent(policy, cfg)?;
    drive_step(&mut agent, 0, 1.0, false)?;
    drive_step(&mut agent, 1, 1.0, false)?;

    assert_eq!(agent.policy().log_prob_calls.get(), 1);
    // nothing ran, so nothing must be reported
    assert!(writer.tagged("Loss/policy").is_empty());
    assert!(writer.tagged("Loss/value").is_empty());
    Ok(())
}

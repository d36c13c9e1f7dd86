pub mod args;

use crate::args::{LoaderOptions, merge_cli_args};
use anyhow::{Context, Result, anyhow, bail};
use candle_core::{Device, Tensor};
use oxrl_core::env::{Env, EnvDescription};
use pyo3::{
    Bound, PyObject, Python,
    types::{PyAny, PyAnyMethods, PyDict, PyDictMethods, PyList, PyListMethods},
};
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::error;

/// Restores the previous working directory when dropped.
struct CwdGuard {
    previous: PathBuf,
}

impl CwdGuard {
    fn change_to(path: &Path) -> Result<Self> {
        let previous = env::current_dir()?;
        env::set_current_dir(path)
            .with_context(|| format!("cannot enter {}", path.display()))?;
        Ok(Self { previous })
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = env::set_current_dir(&self.previous);
    }
}

fn print_cfg(value: &Bound<'_, PyAny>, indent: usize) -> Result<()> {
    let Ok(dict) = value.downcast::<PyDict>() else {
        return Ok(());
    };
    for (key, value) in dict.iter() {
        if value.downcast::<PyDict>().is_ok() {
            print_cfg(&value, indent + 1)?;
        } else {
            println!("{}  |-- {key}: {value}", "  |   ".repeat(indent));
        }
    }
    Ok(())
}

/// A batched dexterous-hands simulation loaded through the python bindings.
///
/// The simulator steps all of its environment instances at once, so every
/// tensor crossing this boundary has a leading `num_envs` dimension.
pub struct SimEnv {
    env: PyObject,
    description: EnvDescription,
    device: Device,
}

impl SimEnv {
    fn state_tensor(&self, value: &Bound<'_, PyAny>) -> Result<Tensor> {
        let rows: Vec<Vec<f64>> = value.call_method0("tolist")?.extract()?;
        let num_envs = rows.len();
        let dim = rows.first().map(|row| row.len()).unwrap_or(0);
        let flat: Vec<f32> = rows.into_iter().flatten().map(|v| v as f32).collect();
        Ok(Tensor::from_vec(flat, (num_envs, dim), &self.device)?)
    }

    fn batch_tensor(&self, value: &Bound<'_, PyAny>) -> Result<Tensor> {
        let values: Vec<f64> = value.call_method0("tolist")?.extract()?;
        let values: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
        let num_envs = values.len();
        Ok(Tensor::from_vec(values, num_envs, &self.device)?)
    }
}

impl Env for SimEnv {
    fn reset(&mut self) -> Result<Tensor> {
        Python::with_gil(|py| {
            let states = self.env.call_method0(py, "reset")?;
            self.state_tensor(states.bind(py))
        })
    }

    fn step(&mut self, actions: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let actions: Vec<Vec<f32>> = actions.to_vec2()?;
        Python::with_gil(|py| {
            let step = self.env.call_method1(py, "step", (actions,))?;
            let step = step.bind(py);
            let next_states = self.state_tensor(&step.get_item(0)?)?;
            let rewards = self.batch_tensor(&step.get_item(1)?)?;
            let dones = self.batch_tensor(&step.get_item(2)?)?;
            Ok((next_states, rewards, dones))
        })
    }

    fn description(&self) -> EnvDescription {
        self.description
    }
}

/// Loads a Bi-DexHands style simulation environment.
///
/// The simulator configures itself from `sys.argv`, so the structured fields
/// of `options` are turned into command line arguments first (explicit flags
/// keep priority, see [`merge_cli_args`]). The package's own config helpers
/// are then driven from inside its source tree, which it assumes to be the
/// working directory while loading task assets.
pub fn load_dexhands_env(options: &LoaderOptions, device: &Device) -> Result<SimEnv> {
    let process_args: Vec<String> = env::args().skip(1).collect();
    let cli_args = merge_cli_args(options, &process_args)?;
    Python::with_gil(|py| {
        let path = match &options.sim_path {
            Some(path) => path.clone(),
            None => {
                let package = py
                    .import("bidexhands")
                    .map_err(|_| anyhow!("the bidexhands package is not installed"))?;
                let paths = py
                    .import("builtins")?
                    .getattr("list")?
                    .call1((package.getattr("__path__")?,))?;
                let paths: Vec<String> = paths.extract()?;
                match paths.first() {
                    Some(path) => PathBuf::from(path),
                    None => bail!("the bidexhands package has no source path"),
                }
            }
        };

        let sys = py.import("sys")?;
        let argv = sys
            .getattr("argv")?
            .downcast_into::<PyList>()
            .map_err(|_| anyhow!("sys.argv is not a list"))?;
        for arg in &cli_args {
            argv.append(arg)?;
        }
        sys.getattr("path")?
            .call_method1("append", (path.to_string_lossy().as_ref(),))?;

        // the config helpers resolve task assets relative to the package tree
        let _cwd = CwdGuard::change_to(&path)?;

        let import = |module: &str| {
            py.import(module).map_err(|err| {
                error!("failed to import {module}: {err}");
                anyhow!("the path ({}) is not a valid simulator tree", path.display())
            })
        };
        let config = import("utils.config")?;
        let parse_task = import("utils.parse_task")?;
        let process_marl = import("utils.process_marl")?;

        let sim_args = config.getattr("get_args")?.call0()?;
        if options.show_cfg {
            let task: String = sim_args.getattr("task")?.extract()?;
            println!("\nsimulation environment ({task})");
            let vars = py.import("builtins")?.getattr("vars")?.call1((&sim_args,))?;
            print_cfg(&vars, 0)?;
        }
        for attr in ["cfg_train", "cfg_env"] {
            let relative: String = sim_args.getattr(attr)?.extract()?;
            sim_args.setattr(attr, path.join(relative).to_string_lossy().as_ref())?;
        }

        let loaded = config.getattr("load_cfg")?.call1((&sim_args,))?;
        let cfg = loaded.get_item(0)?;
        let cfg_train = loaded.get_item(1)?;
        let agent_index = process_marl.getattr("get_AgentIndex")?.call1((&cfg,))?;
        let sim_params = config
            .getattr("parse_sim_params")?
            .call1((&sim_args, &cfg, &cfg_train))?;
        let task_env = parse_task
            .getattr("parse_task")?
            .call1((&sim_args, &cfg, &cfg_train, &sim_params, &agent_index))?;
        let sim_env = task_env.get_item(1)?;

        let description = EnvDescription {
            observation_dim: sim_env.getattr("num_obs")?.extract()?,
            action_dim: sim_env.getattr("num_acts")?.extract()?,
            num_envs: sim_env.getattr("num_envs")?.extract()?,
        };
        Ok(SimEnv {
            env: sim_env.unbind(),
            description,
            device: device.clone(),
        })
    })
}

use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// Options for [`load_dexhands_env`](crate::load_dexhands_env).
///
/// Every field except `task_name` is optional. Arguments that are already
/// present on the process command line take precedence over the fields set
/// here, see [`merge_cli_args`].
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// Name of the task to load, e.g. `ShadowHandOver`.
    pub task_name: Option<String>,
    /// Number of parallel environment instances.
    pub num_envs: Option<usize>,
    /// Run the simulator without a viewer window.
    pub headless: Option<bool>,
    /// Task variant passed through to the simulator.
    pub task_type: Option<String>,
    /// Root of the simulator package. Resolved from the installed python
    /// package when not set.
    pub sim_path: Option<PathBuf>,
    /// Extra arguments forwarded verbatim to the simulator's own parser.
    pub cli_args: Vec<String>,
    /// Print the resolved simulator configuration after loading.
    pub show_cfg: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            task_name: None,
            num_envs: None,
            headless: None,
            task_type: Some("MultiAgent".to_owned()),
            sim_path: None,
            cli_args: vec![],
            show_cfg: true,
        }
    }
}

/// Command line front end mirroring the simulator's own argument names.
#[derive(Debug, Parser)]
#[command(about = "Load a vectorized dexterous-hands simulation environment")]
pub struct LoaderCli {
    /// Task to load, e.g. ShadowHandOver
    #[arg(long)]
    pub task: Option<String>,

    /// Number of parallel environment instances
    #[arg(long)]
    pub num_envs: Option<usize>,

    /// Task variant passed through to the simulator
    #[arg(long)]
    pub task_type: Option<String>,

    /// Run without a viewer window
    #[arg(long)]
    pub headless: bool,

    /// Root of the simulator package
    #[arg(long)]
    pub sim_path: Option<PathBuf>,
}

impl LoaderCli {
    pub fn into_options(self) -> LoaderOptions {
        LoaderOptions {
            task_name: self.task,
            num_envs: self.num_envs,
            headless: self.headless.then_some(true),
            task_type: self.task_type,
            sim_path: self.sim_path,
            ..LoaderOptions::default()
        }
    }
}

fn has_flag(args: &[String], process_args: &[String], flag: &str) -> bool {
    let prefix = format!("{flag}=");
    args.iter()
        .chain(process_args)
        .any(|arg| arg == flag || arg.starts_with(&prefix))
}

/// Builds the argument list handed to the simulator's parser.
///
/// Starts from `options.cli_args` and appends the structured fields, unless
/// the same flag already appears there or in `process_args`. An option field
/// shadowed by an explicit flag is dropped with a warning. A missing task
/// name is an error since the simulator cannot pick one on its own.
pub fn merge_cli_args(options: &LoaderOptions, process_args: &[String]) -> Result<Vec<String>> {
    let mut args = options.cli_args.clone();
    if has_flag(&args, process_args, "--task") {
        if options.task_name.is_some() {
            warn!("ignoring the task_name option, --task is set on the command line");
        }
    } else {
        match &options.task_name {
            Some(task_name) => {
                args.push("--task".to_owned());
                args.push(task_name.clone());
            }
            None => bail!("no task selected, set task_name or pass --task <name>"),
        }
    }
    if has_flag(&args, process_args, "--num_envs") {
        if options.num_envs.is_some() {
            warn!("ignoring the num_envs option, --num_envs is set on the command line");
        }
    } else if let Some(num_envs) = options.num_envs {
        if num_envs == 0 {
            bail!("num_envs must be positive");
        }
        args.push("--num_envs".to_owned());
        args.push(num_envs.to_string());
    }
    if has_flag(&args, process_args, "--task_type") {
        if options.task_type.is_some() {
            warn!("ignoring the task_type option, --task_type is set on the command line");
        }
    } else if let Some(task_type) = &options.task_type {
        if !task_type.is_empty() {
            args.push("--task_type".to_owned());
            args.push(task_type.clone());
        }
    }
    if has_flag(&args, process_args, "--headless") {
        if options.headless.is_some() {
            warn!("ignoring the headless option, --headless is set on the command line");
        }
    } else if options.headless == Some(true) {
        args.push("--headless".to_owned());
    }
    Ok(args)
}

#[cfg(test)]
mod test {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn task_name_is_required() {
        let options = LoaderOptions {
            task_type: None,
            ..LoaderOptions::default()
        };
        assert!(merge_cli_args(&options, &[]).is_err());
    }

    #[test]
    fn structured_fields_become_flags() {
        let options = LoaderOptions {
            task_name: Some("ShadowHandOver".to_owned()),
            num_envs: Some(128),
            headless: Some(true),
            ..LoaderOptions::default()
        };
        let args = merge_cli_args(&options, &[]).unwrap();
        assert_eq!(
            args,
            strings(&[
                "--task",
                "ShadowHandOver",
                "--num_envs",
                "128",
                "--task_type",
                "MultiAgent",
                "--headless",
            ])
        );
    }

    #[test]
    fn explicit_flags_win_over_option_fields() {
        let options = LoaderOptions {
            task_name: Some("ShadowHandOver".to_owned()),
            num_envs: Some(128),
            task_type: None,
            ..LoaderOptions::default()
        };
        let process_args = strings(&["--num_envs=16"]);
        let args = merge_cli_args(&options, &process_args).unwrap();
        assert_eq!(args, strings(&["--task", "ShadowHandOver"]));
    }

    #[test]
    fn preset_cli_args_are_kept_in_front() {
        let options = LoaderOptions {
            task_name: Some("ShadowHandOver".to_owned()),
            task_type: None,
            cli_args: strings(&["--task", "ShadowHandCatchUnderarm"]),
            ..LoaderOptions::default()
        };
        let args = merge_cli_args(&options, &[]).unwrap();
        assert_eq!(args, strings(&["--task", "ShadowHandCatchUnderarm"]));
    }

    #[test]
    fn zero_envs_is_rejected() {
        let options = LoaderOptions {
            task_name: Some("ShadowHandOver".to_owned()),
            num_envs: Some(0),
            ..LoaderOptions::default()
        };
        assert!(merge_cli_args(&options, &[]).is_err());
    }
}

use anyhow::Result;
use candle_core::Device;
use clap::Parser;
use oxrl_agents::PpoBuilder;
use oxrl_core::{
    Algorithm,
    env::Env,
    metrics::{CsvWriter, NullWriter, ScalarWriter},
    rng::set_seed,
    trainer::SequentialTrainer,
};
use oxrl_sim::{args::LoaderCli, load_dexhands_env};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(about = "Train a PPO agent on a dexterous-hands simulation task")]
struct TrainCli {
    #[command(flatten)]
    loader: LoaderCli,

    /// Total environment timesteps to collect
    #[arg(long, default_value_t = 100_000)]
    timesteps: usize,

    /// RNG seed for action sampling and network init
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Write per-update loss scalars to this csv file
    #[arg(long)]
    metrics: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = TrainCli::parse();
    set_seed(cli.seed);

    let device = Device::Cpu;
    let env = load_dexhands_env(&cli.loader.into_options(), &device)?;
    let writer: Box<dyn ScalarWriter> = match &cli.metrics {
        Some(path) => Box::new(CsvWriter::create(path)?),
        None => Box::new(NullWriter),
    };

    let mut builder = PpoBuilder::default();
    builder.cfg.device = device;
    let agent = builder.build(&env.description(), writer)?;

    let mut trainer = SequentialTrainer::new(env, agent, cli.timesteps);
    trainer.train()
}

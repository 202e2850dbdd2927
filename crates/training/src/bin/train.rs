use clap::Parser;
use training::{run_training, TrainArgs};

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing("info");
    let args = TrainArgs::parse();
    run_training(args)?;
    Ok(())
}

//! Train the variational sequence labeler with the per-example prior buffer.

use anyhow::Result;
use candle_core::Device;
use clap::Parser;

use quill_trainer::config::LatentArgs;
use quill_trainer::trainer::{SessionState, run_latent};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = LatentArgs::parse();
    args.validate()?;

    let mut state = SessionState::new();
    let result = run_latent(&args, &mut state, &Device::Cpu);
    // Best-seen results are reported whether the run finished or failed.
    state.report_best();
    result
}

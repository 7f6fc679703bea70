//! Train the biLSTM dataset-mention tagger.

use anyhow::Result;
use candle_core::Device;
use clap::Parser;

use quill_trainer::config::TaggerArgs;
use quill_trainer::trainer::{SessionState, run_tagger};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = TaggerArgs::parse();
    args.validate()?;

    let mut state = SessionState::new();
    let result = run_tagger(&args, &mut state, &Device::Cpu);
    // Best-seen results are reported whether the run finished or failed.
    state.report_best();
    result
}

//! Training stack for the Quill sequence labelers.
//!
//! Builds on [`quill_core`] for the corpus model and metrics, and on candle
//! for tensors and autodiff. The pieces:
//!
//! - [`batch`]: restartable shuffled minibatching with padding masks.
//! - [`embed`]: pretrained embedding matrix construction.
//! - [`model`]: the biLSTM tagger and the variational labeler.
//! - [`prior`]: the rolling per-example latent prior buffer.
//! - [`eval`]: inference-mode evaluation over a split.
//! - [`trainer`]: the training sessions and checkpoint logic.
//! - [`config`]: typed command-line configuration for the binaries.

pub mod batch;
pub mod config;
pub mod embed;
pub mod eval;
pub mod model;
pub mod prior;
pub mod trainer;

pub use batch::{Batch, Minibatcher};
pub use config::{LatentArgs, TaggerArgs};
pub use eval::EvalReport;
pub use model::{BiLstmTagger, VariationalTagger};
pub use prior::PriorBuffer;
pub use trainer::{SessionState, kl_temperature, run_latent, run_tagger};

//! Typed command-line configuration for the training binaries.
//!
//! Every knob is a named, validated field. Validation runs once, right after
//! parsing, and turns bad combinations into errors before any file is opened.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser};

/// Options shared by both training binaries.
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Training corpus (JSONL).
    #[arg(long, env = "QUILL_TRAIN")]
    pub train: PathBuf,

    /// Development corpus (JSONL).
    #[arg(long, env = "QUILL_DEV")]
    pub dev: PathBuf,

    /// Test corpus (JSONL).
    #[arg(long, env = "QUILL_TEST")]
    pub test: PathBuf,

    /// Pretrained word vectors, GloVe text format.
    #[arg(long, env = "QUILL_VECTORS")]
    pub vectors: PathBuf,

    /// Word vector dimensionality.
    #[arg(long, default_value_t = 200)]
    pub embed_dim: usize,

    /// LSTM hidden size per direction.
    #[arg(long, default_value_t = 100)]
    pub hidden_size: usize,

    /// Dropout on embeddings going into the encoder.
    #[arg(long, default_value_t = 0.5)]
    pub dropout_in: f32,

    /// Dropout on encoder states going into the projection.
    #[arg(long, default_value_t = 0.5)]
    pub dropout_out: f32,

    /// AdamW learning rate.
    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Examples per minibatch.
    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Seed for shuffling and embedding init noise.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Directory for checkpoints and metadata.
    #[arg(long, env = "QUILL_CHECKPOINT_DIR", default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,
}

impl CommonArgs {
    fn validate(&self) -> Result<()> {
        if self.embed_dim == 0 {
            bail!("embed-dim must be positive");
        }
        if self.hidden_size == 0 {
            bail!("hidden-size must be positive");
        }
        if self.batch_size == 0 {
            bail!("batch-size must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout_in) || !(0.0..1.0).contains(&self.dropout_out) {
            bail!("dropout rates must be in [0, 1)");
        }
        if self.learning_rate <= 0.0 {
            bail!("learning-rate must be positive");
        }
        Ok(())
    }
}

/// Configuration for the plain biLSTM mention tagger.
#[derive(Debug, Clone, Parser)]
#[command(name = "train-tagger", about = "Train the biLSTM dataset-mention tagger")]
pub struct TaggerArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Number of passes over the training corpus.
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Iterations between rolling-loss log lines.
    #[arg(long, default_value_t = 50)]
    pub print_interval: usize,

    /// Iterations between dev evaluations.
    #[arg(long, default_value_t = 200)]
    pub eval_interval: usize,
}

impl TaggerArgs {
    pub fn validate(&self) -> Result<()> {
        self.common.validate()?;
        if self.epochs == 0 {
            bail!("epochs must be positive");
        }
        if self.print_interval == 0 || self.eval_interval == 0 {
            bail!("print-interval and eval-interval must be positive");
        }
        Ok(())
    }
}

/// Configuration for the variational labeler with the per-example prior
/// buffer.
#[derive(Debug, Clone, Parser)]
#[command(name = "train-latent", about = "Train the variational sequence labeler")]
pub struct LatentArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Total training iterations.
    #[arg(long, default_value_t = 20_000)]
    pub iterations: usize,

    /// Iterations between rolling-loss log lines.
    #[arg(long, default_value_t = 50)]
    pub print_interval: usize,

    /// Iterations between dev evaluations.
    #[arg(long, default_value_t = 200)]
    pub eval_interval: usize,

    /// Latent dimensionality of the per-sentence Gaussian.
    #[arg(long, default_value_t = 32)]
    pub latent_dim: usize,

    /// Iterations over which the KL weight anneals from 0 to 1.
    #[arg(long, default_value_t = 2_000)]
    pub kl_warmup: usize,

    /// Blend a prior row only every n-th time it is touched.
    #[arg(long, default_value_t = 2)]
    pub update_every: u64,

    /// Blend weight toward the new posterior when a row updates.
    #[arg(long, default_value_t = 0.5)]
    pub prior_weight: f32,

    /// Persisted prior buffer; missing file starts from zeros.
    #[arg(long, env = "QUILL_PRIOR_PATH", default_value = "checkpoints/prior.safetensors")]
    pub prior_path: PathBuf,
}

impl LatentArgs {
    pub fn validate(&self) -> Result<()> {
        self.common.validate()?;
        if self.iterations == 0 {
            bail!("iterations must be positive");
        }
        if self.print_interval == 0 || self.eval_interval == 0 {
            bail!("print-interval and eval-interval must be positive");
        }
        if self.latent_dim == 0 {
            bail!("latent-dim must be positive");
        }
        if !(0.0..=1.0).contains(&self.prior_weight) {
            bail!("prior-weight must be in [0, 1]");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger(extra: &[&str]) -> TaggerArgs {
        let mut argv = vec![
            "train-tagger",
            "--train",
            "train.jsonl",
            "--dev",
            "dev.jsonl",
            "--test",
            "test.jsonl",
            "--vectors",
            "glove.txt",
        ];
        argv.extend_from_slice(extra);
        TaggerArgs::parse_from(argv)
    }

    #[test]
    fn test_defaults_validate() {
        assert!(tagger(&[]).validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let args = tagger(&["--batch-size", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_dropout_of_one_rejected() {
        let args = tagger(&["--dropout-in", "1.0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_env_override_fills_missing_arg() {
        unsafe { std::env::set_var("QUILL_VECTORS", "vectors_from_env.txt") };
        let args = TaggerArgs::parse_from([
            "train-tagger",
            "--train",
            "train.jsonl",
            "--dev",
            "dev.jsonl",
            "--test",
            "test.jsonl",
        ]);
        assert_eq!(args.common.vectors, PathBuf::from("vectors_from_env.txt"));
        unsafe { std::env::remove_var("QUILL_VECTORS") };
    }

    #[test]
    fn test_latent_defaults_validate() {
        let args = LatentArgs::parse_from([
            "train-latent",
            "--train",
            "train.jsonl",
            "--dev",
            "dev.jsonl",
            "--test",
            "test.jsonl",
            "--vectors",
            "glove.txt",
        ]);
        assert!(args.validate().is_ok());
        assert_eq!(args.update_every, 2);
    }
}

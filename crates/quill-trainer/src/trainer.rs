//! Training sessions for both labelers.
//!
//! All session state is explicit: the iteration counter, the rolling loss,
//! and the best dev result so far live in a [`SessionState`] owned by the
//! caller. The caller reports the best result after the run returns, on
//! success and on error alike.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use quill_core::corpus::{Example, load_corpus};
use quill_core::vocab::Vocab;

use crate::batch::Minibatcher;
use crate::config::{CommonArgs, LatentArgs, TaggerArgs};
use crate::embed::load_embeddings;
use crate::eval::{evaluate_latent, evaluate_tagger};
use crate::model::{BiLstmTagger, VariationalTagger, gaussian_kl, masked_nll};
use crate::prior::PriorBuffer;

/// KL annealing temperature at a given iteration.
///
/// Ramps linearly from 0 to 1 over `warmup` iterations, then stays at 1.
/// Monotone non-decreasing and always within [0, 1].
pub fn kl_temperature(iteration: usize, warmup: usize) -> f64 {
    if warmup == 0 {
        return 1.0;
    }
    (iteration as f64 / warmup as f64).min(1.0)
}

/// Best-so-far result at a dev evaluation point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestResult {
    pub iteration: usize,
    pub dev_score: f64,
    pub test_score: Option<f64>,
}

/// Explicit mutable state of one training run.
#[derive(Debug, Default)]
pub struct SessionState {
    /// Global iteration counter (optimizer steps taken).
    pub iteration: usize,
    best: Option<BestResult>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dev evaluation at the current iteration. Returns true when
    /// the score strictly improves on the running maximum, which is the
    /// signal to checkpoint.
    pub fn observe_dev(&mut self, dev_score: f64) -> bool {
        let improved = match &self.best {
            Some(best) => dev_score > best.dev_score,
            None => true,
        };
        if improved {
            self.best = Some(BestResult {
                iteration: self.iteration,
                dev_score,
                test_score: None,
            });
        }
        improved
    }

    /// Attach the test score measured at the current best iteration.
    pub fn record_test(&mut self, test_score: f64) {
        if let Some(best) = &mut self.best {
            best.test_score = Some(test_score);
        }
    }

    pub fn best(&self) -> Option<&BestResult> {
        self.best.as_ref()
    }

    /// Log the best-seen result. Called from the binary on every exit path.
    pub fn report_best(&self) {
        match &self.best {
            Some(best) => {
                info!(
                    "best dev score {:.4} at iteration {} (test {})",
                    best.dev_score,
                    best.iteration,
                    best.test_score
                        .map(|s| format!("{:.4}", s))
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
            None => info!("no dev evaluation completed"),
        }
    }
}

fn write_checkpoint(dir: &Path, varmap: &VarMap, best: &BestResult) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating checkpoint dir {}", dir.display()))?;
    let weights = dir.join("model.safetensors");
    varmap
        .save(&weights)
        .with_context(|| format!("saving weights to {}", weights.display()))?;
    let meta = dir.join("best.json");
    let file =
        File::create(&meta).with_context(|| format!("writing metadata {}", meta.display()))?;
    serde_json::to_writer_pretty(file, best)?;
    Ok(())
}

/// Rolling loss average between log lines.
#[derive(Debug, Default)]
struct RollingLoss {
    sum: f64,
    count: usize,
}

impl RollingLoss {
    fn push(&mut self, loss: f64) {
        self.sum += loss;
        self.count += 1;
    }

    fn take(&mut self) -> f64 {
        let avg = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
        self.sum = 0.0;
        self.count = 0;
        avg
    }
}

/// Corpora, vocabulary and embedding matrix shared by both sessions.
struct TrainingData {
    train: Vec<Example>,
    dev: Vec<Example>,
    test: Vec<Example>,
    vocab: Vocab,
    embeddings: Tensor,
}

fn load_training_data(common: &CommonArgs, device: &Device) -> Result<TrainingData> {
    let train = load_corpus(&common.train)?;
    let dev = load_corpus(&common.dev)?;
    let test = load_corpus(&common.test)?;
    if train.is_empty() {
        anyhow::bail!("training corpus {} is empty", common.train.display());
    }
    info!(
        "corpora: {} train, {} dev, {} test examples",
        train.len(),
        dev.len(),
        test.len()
    );

    let vocab = Vocab::build(&train);
    info!("vocabulary: {} entries", vocab.len());
    let embeddings = load_embeddings(
        &common.vectors,
        &vocab,
        common.embed_dim,
        common.seed,
        device,
    )?;

    Ok(TrainingData {
        train,
        dev,
        test,
        vocab,
        embeddings,
    })
}

/// Epoch-driven training of the plain biLSTM tagger. The dev scalar driving
/// checkpoints is span-level mention F1.
pub fn run_tagger(args: &TaggerArgs, state: &mut SessionState, device: &Device) -> Result<()> {
    let data = load_training_data(&args.common, device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BiLstmTagger::new(
        data.embeddings.clone(),
        args.common.hidden_size,
        args.common.dropout_in,
        args.common.dropout_out,
        vb,
    )?;
    let mut opt = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: args.common.learning_rate,
            ..Default::default()
        },
    )?;

    let mut train_batcher = Minibatcher::new(
        &data.train,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );
    let mut dev_batcher = Minibatcher::new(
        &data.dev,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );
    let mut test_batcher = Minibatcher::new(
        &data.test,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );

    let mut rolling = RollingLoss::default();
    for epoch in 0..args.epochs {
        train_batcher.reshuffle();
        while let Some(batch) = train_batcher.next_batch() {
            state.iteration += 1;

            let ids = batch.input_tensor(device)?;
            let labels = batch.label_tensor(device)?;
            let mask = batch.mask_tensor(device)?;

            let log_probs = model.forward(&ids, &batch.lengths, true)?;
            let loss = masked_nll(&log_probs, &labels, &mask)?;
            opt.backward_step(&loss)?;
            rolling.push(loss.to_scalar::<f32>()? as f64);

            if state.iteration % args.print_interval == 0 {
                debug!(
                    "epoch {} iteration {}: loss {:.4}",
                    epoch + 1,
                    state.iteration,
                    rolling.take()
                );
            }

            if state.iteration % args.eval_interval == 0 {
                let report = evaluate_tagger(&model, &mut dev_batcher, device)?;
                report.log("dev");
                maybe_checkpoint(state, report.mention_f1, &varmap, &args.common, || {
                    let test = evaluate_tagger(&model, &mut test_batcher, device)?;
                    test.log("test");
                    Ok(test.mention_f1)
                })?;
            }
        }
        info!("epoch {}/{} complete", epoch + 1, args.epochs);
    }

    Ok(())
}

/// Iteration-driven training of the variational labeler with the per-example
/// prior buffer. The dev scalar driving checkpoints is token-level macro F1.
pub fn run_latent(args: &LatentArgs, state: &mut SessionState, device: &Device) -> Result<()> {
    let data = load_training_data(&args.common, device)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = VariationalTagger::new(
        data.embeddings.clone(),
        args.common.hidden_size,
        args.latent_dim,
        args.common.dropout_in,
        args.common.dropout_out,
        vb,
    )?;
    let mut opt = AdamW::new(
        varmap.all_vars(),
        ParamsAdamW {
            lr: args.common.learning_rate,
            ..Default::default()
        },
    )?;

    let mut prior = PriorBuffer::load_or_init(
        &args.prior_path,
        data.train.len(),
        args.latent_dim,
        args.update_every,
    )?;

    let mut train_batcher = Minibatcher::new(
        &data.train,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );
    let mut dev_batcher = Minibatcher::new(
        &data.dev,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );
    let mut test_batcher = Minibatcher::new(
        &data.test,
        &data.vocab,
        args.common.batch_size,
        args.common.seed,
    );
    train_batcher.reshuffle();

    let mut rolling = RollingLoss::default();
    while state.iteration < args.iterations {
        let batch = match train_batcher.next_batch() {
            Some(batch) => batch,
            None => {
                train_batcher.reshuffle();
                continue;
            }
        };
        state.iteration += 1;

        let ids = batch.input_tensor(device)?;
        let labels = batch.label_tensor(device)?;
        let mask = batch.mask_tensor(device)?;
        let supervision = batch.supervision_mask_tensor(device)?;
        let (prior_mu, prior_logvar) = prior.rows(&batch.indices, device)?;

        let output = model.forward(&ids, &mask, &batch.lengths, true)?;
        let nll = masked_nll(&output.log_probs, &labels, &supervision)?;
        let kl = gaussian_kl(&output.mu, &output.logvar, &prior_mu, &prior_logvar)?;
        let temp = kl_temperature(state.iteration, args.kl_warmup);
        let loss = (&nll + (kl * temp)?)?;
        opt.backward_step(&loss)?;

        prior.update(
            &batch.indices,
            &output.mu.detach(),
            &output.logvar.detach(),
            args.prior_weight,
        )?;
        rolling.push(loss.to_scalar::<f32>()? as f64);

        if state.iteration % args.print_interval == 0 {
            debug!(
                "iteration {}/{}: loss {:.4}, kl temp {:.3}",
                state.iteration,
                args.iterations,
                rolling.take(),
                temp
            );
        }

        if state.iteration % args.eval_interval == 0 {
            let report = evaluate_latent(&model, &mut dev_batcher, device)?;
            report.log("dev");
            let improved =
                maybe_checkpoint(state, report.macro_f1, &varmap, &args.common, || {
                    let test = evaluate_latent(&model, &mut test_batcher, device)?;
                    test.log("test");
                    Ok(test.macro_f1)
                })?;
            if improved {
                prior.save(&args.prior_path)?;
            }
        }
    }

    Ok(())
}

/// Shared checkpoint logic: on strict dev improvement, measure the test set
/// and persist weights plus metadata.
fn maybe_checkpoint<F>(
    state: &mut SessionState,
    dev_score: f64,
    varmap: &VarMap,
    common: &CommonArgs,
    eval_test: F,
) -> Result<bool>
where
    F: FnOnce() -> Result<f64>,
{
    if !state.observe_dev(dev_score) {
        return Ok(false);
    }

    let test_score = eval_test()?;
    state.record_test(test_score);
    if let Some(best) = state.best() {
        write_checkpoint(&common.checkpoint_dir, varmap, best)?;
        info!(
            "checkpoint: dev {:.4} at iteration {}",
            best.dev_score, best.iteration
        );
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kl_temperature_is_monotone_and_bounded() {
        let mut last = 0.0;
        for iteration in 0..5000 {
            let temp = kl_temperature(iteration, 2000);
            assert!((0.0..=1.0).contains(&temp));
            assert!(temp >= last);
            last = temp;
        }
        assert_eq!(kl_temperature(2000, 2000), 1.0);
        assert_eq!(kl_temperature(50_000, 2000), 1.0);
    }

    #[test]
    fn test_kl_temperature_zero_warmup_is_full_strength() {
        assert_eq!(kl_temperature(0, 0), 1.0);
        assert_eq!(kl_temperature(123, 0), 1.0);
    }

    #[test]
    fn test_checkpoints_fire_on_strict_improvement_only() {
        // Scripted dev scores; checkpoints must fire exactly at strict
        // running-maximum improvements.
        let scores = [0.2, 0.2, 0.5, 0.4, 0.5, 0.6, 0.6];
        let expected = [true, false, true, false, false, true, false];

        let mut state = SessionState::new();
        for (score, want) in scores.iter().zip(expected.iter()) {
            state.iteration += 1;
            assert_eq!(state.observe_dev(*score), *want);
        }

        let best = state.best().unwrap();
        assert_eq!(best.dev_score, 0.6);
        assert_eq!(best.iteration, 6);
    }

    #[test]
    fn test_first_observation_always_checkpoints() {
        let mut state = SessionState::new();
        state.iteration = 1;
        assert!(state.observe_dev(0.0));
    }

    #[test]
    fn test_record_test_attaches_to_best() {
        let mut state = SessionState::new();
        state.iteration = 10;
        state.observe_dev(0.7);
        state.record_test(0.65);
        let best = state.best().unwrap();
        assert_eq!(best.test_score, Some(0.65));
        assert_eq!(best.iteration, 10);
    }
}

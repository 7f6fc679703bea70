//! Sequence-labeling models built on candle.
//!
//! Both models share a biLSTM encoder over frozen pretrained embeddings.
//! [`BiLstmTagger`] projects encoder states straight to tag log-probabilities.
//! [`VariationalTagger`] additionally infers a per-sentence latent Gaussian,
//! conditions the tag projection on a sample from it, and reports the
//! posterior parameters so the training loop can feed the prior buffer.

use candle_core::{D, Device, Result, Tensor, bail};
use candle_nn::ops::log_softmax;
use candle_nn::{Dropout, Embedding, LSTM, LSTMConfig, Linear, Module, RNN, VarBuilder, linear, lstm};

use quill_core::tags::MentionTag;

/// Reverse each row of a `(batch, time, dim)` tensor within its true length,
/// leaving pad positions in place.
///
/// Keeps the backward LSTM from consuming pad embeddings before a short
/// row's real tokens: after this reversal the real tokens come first and the
/// pads trail, so states at valid positions depend only on real tokens. The
/// mapping is an involution, applying it again restores the original order.
fn reverse_within_lengths(xs: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    let (b, t, d) = xs.dims3()?;
    if lengths.len() != b {
        bail!("{} lengths for a batch of {}", lengths.len(), b);
    }

    let mut idx = Vec::with_capacity(b * t);
    for &len in lengths {
        for pos in 0..t {
            let j = if pos < len { len - 1 - pos } else { pos };
            idx.push(j as u32);
        }
    }
    let idx = Tensor::from_vec(idx, (b, t), xs.device())?
        .unsqueeze(2)?
        .expand((b, t, d))?
        .contiguous()?;
    xs.gather(&idx, 1)
}

/// Bidirectional LSTM encoder over frozen embeddings.
///
/// The embedding table is built from pretrained vectors and deliberately not
/// registered with the `VarBuilder`, so the optimizer never touches it.
pub struct BiLstmEncoder {
    embed: Embedding,
    fwd: LSTM,
    bwd: LSTM,
    drop_in: Dropout,
    drop_out: Dropout,
    hidden_size: usize,
}

impl BiLstmEncoder {
    pub fn new(
        embed_weights: Tensor,
        hidden_size: usize,
        dropout_in: f32,
        dropout_out: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let (_, embed_dim) = embed_weights.dims2()?;
        let embed = Embedding::new(embed_weights, embed_dim);
        let fwd = lstm(embed_dim, hidden_size, LSTMConfig::default(), vb.pp("fwd"))?;
        let bwd = lstm(embed_dim, hidden_size, LSTMConfig::default(), vb.pp("bwd"))?;

        Ok(Self {
            embed,
            fwd,
            bwd,
            drop_in: Dropout::new(dropout_in),
            drop_out: Dropout::new(dropout_out),
            hidden_size,
        })
    }

    /// Output feature width: forward and backward states concatenated.
    pub fn output_dim(&self) -> usize {
        self.hidden_size * 2
    }

    /// Encode `(batch, time)` token ids into `(batch, time, 2 * hidden)`.
    ///
    /// `lengths` gives each row's true token count. States at valid
    /// positions depend only on that row's real tokens, never on how much
    /// padding the batch added.
    pub fn forward(&self, ids: &Tensor, lengths: &[usize], train: bool) -> Result<Tensor> {
        let xs = self.embed.forward(ids)?;
        let xs = self.drop_in.forward(&xs, train)?;

        let fwd_states = self.fwd.seq(&xs)?;
        let hf = self.fwd.states_to_tensor(&fwd_states)?;

        let xs_rev = reverse_within_lengths(&xs, lengths)?.contiguous()?;
        let bwd_states = self.bwd.seq(&xs_rev)?;
        let hb = reverse_within_lengths(&self.bwd.states_to_tensor(&bwd_states)?, lengths)?;

        let h = Tensor::cat(&[&hf, &hb], D::Minus1)?;
        self.drop_out.forward(&h, train)
    }
}

/// biLSTM tagger: encoder states straight to tag log-probabilities.
pub struct BiLstmTagger {
    encoder: BiLstmEncoder,
    proj: Linear,
}

impl BiLstmTagger {
    pub fn new(
        embed_weights: Tensor,
        hidden_size: usize,
        dropout_in: f32,
        dropout_out: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let encoder = BiLstmEncoder::new(
            embed_weights,
            hidden_size,
            dropout_in,
            dropout_out,
            vb.pp("encoder"),
        )?;
        let proj = linear(encoder.output_dim(), MentionTag::NUM_TAGS, vb.pp("proj"))?;
        Ok(Self { encoder, proj })
    }

    /// Tag log-probabilities of shape `(batch, time, num_tags)`.
    pub fn forward(&self, ids: &Tensor, lengths: &[usize], train: bool) -> Result<Tensor> {
        let h = self.encoder.forward(ids, lengths, train)?;
        let logits = self.proj.forward(&h)?;
        log_softmax(&logits, D::Minus1)
    }
}

/// Output of one variational forward pass.
pub struct LatentOutput {
    /// Tag log-probabilities, `(batch, time, num_tags)`.
    pub log_probs: Tensor,
    /// Posterior means, `(batch, latent_dim)`.
    pub mu: Tensor,
    /// Posterior log-variances, `(batch, latent_dim)`.
    pub logvar: Tensor,
}

/// Label-conditioned latent-variable sequence labeler.
pub struct VariationalTagger {
    encoder: BiLstmEncoder,
    mu_head: Linear,
    logvar_head: Linear,
    proj: Linear,
    latent_dim: usize,
}

impl VariationalTagger {
    pub fn new(
        embed_weights: Tensor,
        hidden_size: usize,
        latent_dim: usize,
        dropout_in: f32,
        dropout_out: f32,
        vb: VarBuilder,
    ) -> Result<Self> {
        let encoder = BiLstmEncoder::new(
            embed_weights,
            hidden_size,
            dropout_in,
            dropout_out,
            vb.pp("encoder"),
        )?;
        let mu_head = linear(encoder.output_dim(), latent_dim, vb.pp("mu"))?;
        let logvar_head = linear(encoder.output_dim(), latent_dim, vb.pp("logvar"))?;
        let proj = linear(
            encoder.output_dim() + latent_dim,
            MentionTag::NUM_TAGS,
            vb.pp("proj"),
        )?;
        Ok(Self {
            encoder,
            mu_head,
            logvar_head,
            proj,
            latent_dim,
        })
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Forward pass. `mask` is the `(batch, time)` padding mask used for
    /// mean-pooling the encoder states, `lengths` the true token counts. In
    /// training mode `z` is sampled by reparameterization; in inference mode
    /// the posterior mean is used.
    pub fn forward(
        &self,
        ids: &Tensor,
        mask: &Tensor,
        lengths: &[usize],
        train: bool,
    ) -> Result<LatentOutput> {
        let h = self.encoder.forward(ids, lengths, train)?;
        let (batch, time, _) = h.dims3()?;

        // Masked mean-pool over time.
        let m = mask.unsqueeze(D::Minus1)?;
        let pooled = h.broadcast_mul(&m)?.sum(1)?;
        let denom = mask.sum(1)?.maximum(1.0)?.unsqueeze(D::Minus1)?;
        let pooled = pooled.broadcast_div(&denom)?;

        let mu = self.mu_head.forward(&pooled)?;
        let logvar = self.logvar_head.forward(&pooled)?;

        let z = if train {
            let std = (&logvar * 0.5)?.exp()?;
            let eps = mu.randn_like(0.0, 1.0)?;
            (&mu + (std * eps)?)?
        } else {
            mu.clone()
        };

        let z_seq = z
            .unsqueeze(1)?
            .expand((batch, time, self.latent_dim))?
            .contiguous()?;
        let features = Tensor::cat(&[&h, &z_seq], D::Minus1)?;
        let logits = self.proj.forward(&features)?;
        let log_probs = log_softmax(&logits, D::Minus1)?;

        Ok(LatentOutput {
            log_probs,
            mu,
            logvar,
        })
    }
}

/// Masked negative log-likelihood.
///
/// `log_probs` is `(batch, time, num_tags)`, `labels` is `(batch, time)` tag
/// indices, `mask` is `(batch, time)` with 0.0 on positions excluded from
/// the loss. Masked positions contribute exactly zero regardless of their
/// label or score content. Returns a scalar averaged over kept positions;
/// a fully masked batch yields zero rather than NaN.
pub fn masked_nll(log_probs: &Tensor, labels: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let picked = log_probs
        .gather(&labels.unsqueeze(D::Minus1)?, D::Minus1)?
        .squeeze(D::Minus1)?;
    let kept = (picked * mask)?.sum_all()?;
    let count = mask.sum_all()?.maximum(1.0)?;
    (kept / count)?.neg()
}

/// KL divergence between diagonal Gaussians, KL(q || p), averaged over the
/// batch. All four tensors are `(batch, latent_dim)`.
pub fn gaussian_kl(
    q_mu: &Tensor,
    q_logvar: &Tensor,
    p_mu: &Tensor,
    p_logvar: &Tensor,
) -> Result<Tensor> {
    let var_q = q_logvar.exp()?;
    let var_p = p_logvar.exp()?;
    let diff = (q_mu - p_mu)?;

    let term = ((&var_q + diff.sqr()?)? / &var_p)?;
    let per_dim = (((p_logvar - q_logvar)? + term)? - 1.0)?;
    let per_example = (per_dim.sum(D::Minus1)? * 0.5)?;
    per_example.mean_all()
}

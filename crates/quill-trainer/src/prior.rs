//! Rolling prior buffer of per-example latent statistics.
//!
//! One row per corpus example, holding the mean and log-variance of that
//! example's latent distribution. The training loop reads rows as priors,
//! and writes the model's posterior parameters back after each step through
//! a frequency-gated exponential blend. The whole buffer persists as a
//! safetensors file keyed by component name.

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Result as CandleResult, Tensor, bail};
use tracing::{info, warn};

/// Per-example latent statistics with gated in-place updates.
pub struct PriorBuffer {
    means: Vec<Vec<f32>>,
    logvars: Vec<Vec<f32>>,
    /// How many times each row has been touched by an update.
    touches: Vec<u64>,
    latent_dim: usize,
    /// Blend only every `update_every`-th touch of a row.
    update_every: u64,
}

impl PriorBuffer {
    /// Zero-initialized buffer: zero mean, zero log-variance (unit variance).
    pub fn new(num_examples: usize, latent_dim: usize, update_every: u64) -> Self {
        Self {
            means: vec![vec![0.0; latent_dim]; num_examples],
            logvars: vec![vec![0.0; latent_dim]; num_examples],
            touches: vec![0; num_examples],
            latent_dim,
            update_every: update_every.max(1),
        }
    }

    /// Load a persisted buffer, degrading gracefully to zero-initialization
    /// when the file does not exist. A file with the wrong corpus size is an
    /// error: rows are keyed by example index and must line up exactly.
    pub fn load_or_init(
        path: &Path,
        num_examples: usize,
        latent_dim: usize,
        update_every: u64,
    ) -> CandleResult<Self> {
        if !path.exists() {
            warn!(
                "no prior buffer at {}, starting from zero-initialization",
                path.display()
            );
            return Ok(Self::new(num_examples, latent_dim, update_every));
        }

        let tensors = candle_core::safetensors::load(path, &Device::Cpu)?;
        let mean = match tensors.get("mean") {
            Some(t) => t,
            None => bail!("prior buffer {} has no 'mean' tensor", path.display()),
        };
        let logvar = match tensors.get("logvar") {
            Some(t) => t,
            None => bail!("prior buffer {} has no 'logvar' tensor", path.display()),
        };

        let (rows, dim) = mean.dims2()?;
        if rows != num_examples || dim != latent_dim {
            bail!(
                "prior buffer {} is {}x{}, corpus needs {}x{}",
                path.display(),
                rows,
                dim,
                num_examples,
                latent_dim
            );
        }

        info!("loaded prior buffer from {}", path.display());
        Ok(Self {
            means: mean.to_vec2()?,
            logvars: logvar.to_vec2()?,
            touches: vec![0; num_examples],
            latent_dim,
            update_every: update_every.max(1),
        })
    }

    /// Number of rows (equals corpus size, never changes).
    pub fn len(&self) -> usize {
        self.means.len()
    }

    /// Whether the buffer has no rows.
    pub fn is_empty(&self) -> bool {
        self.means.is_empty()
    }

    /// Latent dimensionality of each row.
    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    /// Current (mean, logvar) rows for a set of example indices, as
    /// `(batch, latent_dim)` tensors.
    pub fn rows(&self, indices: &[usize], device: &Device) -> CandleResult<(Tensor, Tensor)> {
        let mut means = Vec::with_capacity(indices.len() * self.latent_dim);
        let mut logvars = Vec::with_capacity(indices.len() * self.latent_dim);
        for &i in indices {
            if i >= self.means.len() {
                bail!("prior buffer index {} out of range ({})", i, self.means.len());
            }
            means.extend_from_slice(&self.means[i]);
            logvars.extend_from_slice(&self.logvars[i]);
        }
        let shape = (indices.len(), self.latent_dim);
        Ok((
            Tensor::from_vec(means, shape, device)?,
            Tensor::from_vec(logvars, shape, device)?,
        ))
    }

    /// Blend new posterior rows into the buffer.
    ///
    /// Every touch increments the row's counter; on every `update_every`-th
    /// touch the stored row becomes `(1 - weight) * old + weight * new`.
    /// `means` and `logvars` are `(batch, latent_dim)` tensors aligned with
    /// `indices`.
    pub fn update(
        &mut self,
        indices: &[usize],
        means: &Tensor,
        logvars: &Tensor,
        weight: f32,
    ) -> CandleResult<()> {
        let new_means: Vec<Vec<f32>> = means.to_vec2()?;
        let new_logvars: Vec<Vec<f32>> = logvars.to_vec2()?;
        if new_means.len() != indices.len() || new_logvars.len() != indices.len() {
            bail!(
                "update rows ({}) do not match indices ({})",
                new_means.len(),
                indices.len()
            );
        }

        for (row, &i) in indices.iter().enumerate() {
            if i >= self.means.len() {
                bail!("prior buffer index {} out of range ({})", i, self.means.len());
            }
            self.touches[i] += 1;
            if self.touches[i] % self.update_every != 0 {
                continue;
            }
            blend(&mut self.means[i], &new_means[row], weight);
            blend(&mut self.logvars[i], &new_logvars[row], weight);
        }

        Ok(())
    }

    /// Persist the whole buffer to `path` as safetensors.
    pub fn save(&self, path: &Path) -> CandleResult<()> {
        let shape = (self.means.len(), self.latent_dim);
        let mean = Tensor::from_vec(
            self.means.iter().flatten().copied().collect::<Vec<f32>>(),
            shape,
            &Device::Cpu,
        )?;
        let logvar = Tensor::from_vec(
            self.logvars.iter().flatten().copied().collect::<Vec<f32>>(),
            shape,
            &Device::Cpu,
        )?;

        let mut tensors = HashMap::new();
        tensors.insert("mean".to_string(), mean);
        tensors.insert("logvar".to_string(), logvar);
        candle_core::safetensors::save(&tensors, path)?;
        Ok(())
    }
}

fn blend(stored: &mut [f32], new: &[f32], weight: f32) {
    for (s, &n) in stored.iter_mut().zip(new.iter()) {
        *s = (1.0 - weight) * *s + weight * n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(rows: &[&[f32]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::from_vec(flat, (rows.len(), rows[0].len()), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_zero_init() {
        let buffer = PriorBuffer::new(3, 2, 1);
        let (means, logvars) = buffer.rows(&[0, 2], &Device::Cpu).unwrap();
        assert_eq!(means.to_vec2::<f32>().unwrap(), vec![vec![0.0, 0.0]; 2]);
        assert_eq!(logvars.to_vec2::<f32>().unwrap(), vec![vec![0.0, 0.0]; 2]);
    }

    #[test]
    fn test_update_blends_every_touch_when_ufl_is_one() {
        let mut buffer = PriorBuffer::new(2, 2, 1);
        buffer
            .update(&[0], &tensor(&[&[1.0, 2.0]]), &tensor(&[&[0.5, 0.5]]), 0.5)
            .unwrap();

        let (means, logvars) = buffer.rows(&[0], &Device::Cpu).unwrap();
        assert_eq!(means.to_vec2::<f32>().unwrap()[0], vec![0.5, 1.0]);
        assert_eq!(logvars.to_vec2::<f32>().unwrap()[0], vec![0.25, 0.25]);
        // Untouched row stays zero.
        let (other, _) = buffer.rows(&[1], &Device::Cpu).unwrap();
        assert_eq!(other.to_vec2::<f32>().unwrap()[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_update_frequency_gating() {
        let mut buffer = PriorBuffer::new(1, 1, 2);
        let new = tensor(&[&[4.0]]);
        let lv = tensor(&[&[0.0]]);

        // First touch: gated, no change.
        buffer.update(&[0], &new, &lv, 1.0).unwrap();
        let (means, _) = buffer.rows(&[0], &Device::Cpu).unwrap();
        assert_eq!(means.to_vec2::<f32>().unwrap()[0], vec![0.0]);

        // Second touch: blend applies.
        buffer.update(&[0], &new, &lv, 1.0).unwrap();
        let (means, _) = buffer.rows(&[0], &Device::Cpu).unwrap();
        assert_eq!(means.to_vec2::<f32>().unwrap()[0], vec![4.0]);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join("quill_prior_roundtrip.safetensors");
        let mut buffer = PriorBuffer::new(3, 4, 1);
        buffer
            .update(
                &[1],
                &tensor(&[&[1.0, -1.0, 2.0, -2.0]]),
                &tensor(&[&[0.1, 0.2, 0.3, 0.4]]),
                1.0,
            )
            .unwrap();
        buffer.save(&path).unwrap();

        let loaded = PriorBuffer::load_or_init(&path, 3, 4, 1).unwrap();
        let (m0, l0) = buffer.rows(&[0, 1, 2], &Device::Cpu).unwrap();
        let (m1, l1) = loaded.rows(&[0, 1, 2], &Device::Cpu).unwrap();
        assert_eq!(m0.to_vec2::<f32>().unwrap(), m1.to_vec2::<f32>().unwrap());
        assert_eq!(l0.to_vec2::<f32>().unwrap(), l1.to_vec2::<f32>().unwrap());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_degrades_to_zero_init() {
        let path = std::env::temp_dir().join("quill_prior_does_not_exist.safetensors");
        std::fs::remove_file(&path).ok();
        let buffer = PriorBuffer::load_or_init(&path, 2, 3, 1).unwrap();
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latent_dim(), 3);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let path = std::env::temp_dir().join("quill_prior_mismatch.safetensors");
        PriorBuffer::new(2, 2, 1).save(&path).unwrap();
        assert!(PriorBuffer::load_or_init(&path, 3, 2, 1).is_err());
        assert!(PriorBuffer::load_or_init(&path, 2, 4, 1).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_out_of_range_index_is_error() {
        let buffer = PriorBuffer::new(2, 2, 1);
        assert!(buffer.rows(&[5], &Device::Cpu).is_err());
    }
}

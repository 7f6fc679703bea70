//! Pretrained embedding matrix construction.
//!
//! Reads a GloVe-format text file (one `word v1 v2 ...` line per entry) and
//! builds a matrix aligned to the training vocabulary. The matrix feeds a
//! frozen `Embedding`; it is never registered with the optimizer.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result, bail};
use candle_core::{Device, Tensor};
use oorandom::Rand32;
use tracing::info;

use quill_core::vocab::{PAD_IDX, UNK_IDX, UNK_TOKEN, Vocab};

const NOISE_SCALE: f32 = 0.25;

/// Build a `(vocab_len, dim)` embedding matrix from a GloVe text file.
///
/// The pad row is all zeros. Vocabulary words missing from the vectors file
/// get small uniform noise in `[-0.25, 0.25)` so they are distinguishable
/// from padding.
pub fn load_embeddings(
    path: &Path,
    vocab: &Vocab,
    dim: usize,
    seed: u64,
    device: &Device,
) -> Result<Tensor> {
    let file = File::open(path).with_context(|| format!("opening vectors {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut rng = Rand32::new(seed);
    let mut rows: Vec<Vec<f32>> = (0..vocab.len())
        .map(|i| {
            if i == PAD_IDX as usize {
                vec![0.0; dim]
            } else {
                (0..dim)
                    .map(|_| (rng.rand_float() * 2.0 - 1.0) * NOISE_SCALE)
                    .collect()
            }
        })
        .collect();

    let mut hits = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading vectors {}", path.display()))?;
        let mut fields = line.split_whitespace();
        let word = match fields.next() {
            Some(w) => w,
            None => continue,
        };
        let idx = vocab.index(word);
        if idx == UNK_IDX && word != UNK_TOKEN {
            continue;
        }

        let values: Vec<f32> = fields
            .map(|f| f.parse::<f32>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("{}:{}: bad vector value", path.display(), line_no + 1))?;
        if values.len() != dim {
            bail!(
                "{}:{}: expected {} dims, found {}",
                path.display(),
                line_no + 1,
                dim,
                values.len()
            );
        }

        rows[idx as usize] = values;
        hits += 1;
    }

    info!(
        "embeddings: {}/{} vocabulary words found in {}",
        hits,
        vocab.len(),
        path.display()
    );

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Ok(Tensor::from_vec(flat, (vocab.len(), dim), device)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::corpus::Example;
    use quill_core::tags::MentionTag;

    fn vocab_for(words: &[&str]) -> Vocab {
        let example = Example::new(
            0,
            words.iter().map(|w| w.to_string()).collect(),
            vec![MentionTag::Outside; words.len()],
        )
        .unwrap();
        Vocab::build(std::slice::from_ref(&example))
    }

    #[test]
    fn test_known_words_use_file_vectors() {
        let path = std::env::temp_dir().join("quill_embed_known.txt");
        std::fs::write(&path, "alpha 1.0 2.0\nbeta -1.0 0.5\n").unwrap();

        let vocab = vocab_for(&["alpha", "beta"]);
        let matrix = load_embeddings(&path, &vocab, 2, 0, &Device::Cpu).unwrap();
        let rows: Vec<Vec<f32>> = matrix.to_vec2().unwrap();

        let alpha = vocab.index("alpha") as usize;
        let beta = vocab.index("beta") as usize;
        assert_eq!(rows[alpha], vec![1.0, 2.0]);
        assert_eq!(rows[beta], vec![-1.0, 0.5]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_pad_row_is_zero_and_unknowns_are_noisy() {
        let path = std::env::temp_dir().join("quill_embed_pad.txt");
        std::fs::write(&path, "alpha 1.0 2.0\n").unwrap();

        let vocab = vocab_for(&["alpha", "missing"]);
        let matrix = load_embeddings(&path, &vocab, 2, 7, &Device::Cpu).unwrap();
        let rows: Vec<Vec<f32>> = matrix.to_vec2().unwrap();

        assert_eq!(rows[PAD_IDX as usize], vec![0.0, 0.0]);
        let missing = vocab.index("missing") as usize;
        assert!(rows[missing].iter().any(|&v| v != 0.0));
        assert!(rows[missing].iter().all(|&v| v.abs() <= NOISE_SCALE));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let path = std::env::temp_dir().join("quill_embed_dims.txt");
        std::fs::write(&path, "alpha 1.0 2.0 3.0\n").unwrap();

        let vocab = vocab_for(&["alpha"]);
        assert!(load_embeddings(&path, &vocab, 2, 0, &Device::Cpu).is_err());

        std::fs::remove_file(&path).ok();
    }
}

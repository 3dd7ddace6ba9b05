//! Embedding engine trait and the dependency-free hashing implementation.
//!
//! Implementations:
//! - `OnnxEmbedder`: ONNX Runtime sentence model (requires the `onnx` feature)
//! - `HashingEmbedder`: signed feature hashing of word unigrams and bigrams

use ndarray::{Array1, Array2};

use ticketscope_core::{Error, Result};

/// Trait for embedding backends.
pub trait EmbedderBackend: Send + Sync {
    /// Generate an embedding for a text string.
    fn embed(&self, text: &str) -> Result<Array1<f32>>;

    /// Generate embeddings for a batch of texts, one row per text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((texts.len(), self.dimension()));
        for (i, text) in texts.iter().enumerate() {
            let row = self.embed(text)?;
            if row.len() != self.dimension() {
                return Err(Error::Inference(format!(
                    "Embedding has {} dims, expected {}",
                    row.len(),
                    self.dimension()
                )));
            }
            out.row_mut(i).assign(&row);
        }
        Ok(out)
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Identifier recorded with every run.
    fn model_name(&self) -> String;
}

/// Bag-of-words embedding via the hashing trick. Deterministic across runs
/// and platforms.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(512)
    }
}

impl EmbedderBackend for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Array1<f32>> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .collect();

        let mut v = Array1::<f32>::zeros(self.dim);
        let mut add = |feature: &str, weight: f32| {
            let h = fnv1a(feature.as_bytes());
            let idx = (h % self.dim as u64) as usize;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign * weight;
        };
        for t in &tokens {
            add(t, 1.0);
        }
        for pair in tokens.windows(2) {
            add(&format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let norm = v.dot(&v).sqrt();
        if norm > 0.0 {
            v /= norm;
        }
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> String {
        format!("hashing-{}", self.dim)
    }
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in bytes {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_is_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64);
        let a = e.embed("License activation fails").unwrap();
        let b = e.embed("license ACTIVATION fails!").unwrap();
        assert_eq!(a, b);
        assert!((a.dot(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let e = HashingEmbedder::new(16);
        assert!(e.embed("").unwrap().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_batch_shape() {
        let e = HashingEmbedder::new(32);
        let m = e.embed_batch(&["a b c", "export crash"]).unwrap();
        assert_eq!(m.dim(), (2, 32));
        assert_eq!(e.model_name(), "hashing-32");
    }
}

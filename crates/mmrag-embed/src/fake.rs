use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use mmrag_core::error::Result;
use mmrag_core::traits::Embedder;

/// Bag-of-words hashing embedder. Same text in, same unit vector out; texts
/// sharing words land close together. No model needed.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for FakeEmbedder {
    fn name(&self) -> &str {
        "fake"
    }

    fn embed(&self, _model_id: &str, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text))
    }
}

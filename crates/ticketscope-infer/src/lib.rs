//! ticketscope infer: the numeric side of topic discovery.
//!
//! Everything a topic run needs from a model sits behind [`TopicBackend`].
//! [`LocalTopicBackend`] chains an [`EmbedderBackend`], a seeded random
//! projection, centroid clustering and c-TF-IDF keyword ranking. When the
//! `onnx` feature is enabled and model files are present, `OnnxEmbedder`
//! loads a SentenceTransformers model; otherwise `HashingEmbedder` is used.

pub mod backend;
pub mod cluster;
pub mod ctfidf;
pub mod embedder;
pub mod onnx_embedder;
pub mod reduce;

pub use backend::{FittedTopic, LocalTopicBackend, TopicBackend, TopicFit};
pub use embedder::{EmbedderBackend, HashingEmbedder};

#[cfg(feature = "onnx")]
pub use onnx_embedder::OnnxEmbedder;

use std::path::Path;
use std::sync::Arc;

/// Create the best available embedder for the given model directory.
///
/// Tries ONNX first (if feature enabled and model files present),
/// falls back to the hashing embedder.
pub fn create_embedder(model_dir: &Path) -> Arc<dyn EmbedderBackend> {
    #[cfg(feature = "onnx")]
    {
        match OnnxEmbedder::load(model_dir) {
            Ok(embedder) => {
                tracing::info!("Using ONNX embedder (dim={})", embedder.dimension());
                return Arc::new(embedder);
            }
            Err(e) => {
                tracing::warn!("ONNX embedder unavailable: {}. Falling back to hashing.", e);
            }
        }
    }

    #[cfg(not(feature = "onnx"))]
    {
        let _ = model_dir;
        tracing::info!("ONNX feature disabled. Using hashing embedder.");
    }

    Arc::new(HashingEmbedder::default())
}

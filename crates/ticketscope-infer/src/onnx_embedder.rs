//! ONNX-based sentence embeddings.
//!
//! Loads a SentenceTransformers ONNX export and its tokenizer from
//! `data/models/`. Requires the `onnx` feature.

#[cfg(feature = "onnx")]
mod inner {
    use std::path::Path;

    use ndarray::Array1;
    use ort::session::Session;
    use ort::value::Tensor;
    use parking_lot::Mutex;
    use tokenizers::Tokenizer;
    use tracing::info;

    use crate::embedder::EmbedderBackend;
    use ticketscope_core::{Error, Result};

    /// Maximum sequence length for the model.
    const MAX_SEQ_LEN: usize = 256;

    /// Output dimension of all-MiniLM-L6-v2.
    const DEFAULT_DIM: usize = 384;

    pub struct OnnxEmbedder {
        session: Mutex<Session>,
        tokenizer: Tokenizer,
        dimension: usize,
        name: String,
    }

    fn inference_err(context: &str) -> impl Fn(ort::Error) -> Error + '_ {
        move |e| Error::Inference(format!("{}: {}", context, e))
    }

    impl OnnxEmbedder {
        /// Load `model_dir/model.onnx` and `model_dir/tokenizer.json`.
        pub fn load(model_dir: &Path) -> Result<Self> {
            let model_path = model_dir.join("model.onnx");
            let tokenizer_path = model_dir.join("tokenizer.json");

            if !model_path.exists() {
                return Err(Error::NotFound(format!("Model not found: {}", model_path.display())));
            }
            if !tokenizer_path.exists() {
                return Err(Error::NotFound(format!(
                    "Tokenizer not found: {}",
                    tokenizer_path.display()
                )));
            }

            // With load-dynamic, ORT_DYLIB_PATH must point to libonnxruntime.
            ort::init().commit();

            let session = Session::builder()
                .map_err(inference_err("Failed to create session builder"))?
                .with_intra_threads(2)
                .map_err(inference_err("Failed to set threads"))?
                .commit_from_file(&model_path)
                .map_err(inference_err("Failed to load ONNX model"))?;

            let tokenizer = Tokenizer::from_file(&tokenizer_path)
                .map_err(|e| Error::Inference(format!("Failed to load tokenizer: {}", e)))?;

            let name = model_dir
                .file_name()
                .map(|n| format!("onnx:{}", n.to_string_lossy()))
                .unwrap_or_else(|| "onnx".into());
            info!("ONNX embedder loaded: dim={}, model={}", DEFAULT_DIM, model_path.display());

            Ok(Self {
                session: Mutex::new(session),
                tokenizer,
                dimension: DEFAULT_DIM,
                name,
            })
        }
    }

    impl EmbedderBackend for OnnxEmbedder {
        fn embed(&self, text: &str) -> Result<Array1<f32>> {
            let encoding = self
                .tokenizer
                .encode(text, true)
                .map_err(|e| Error::Inference(format!("Tokenization failed: {}", e)))?;

            let seq_len = encoding.get_ids().len().min(MAX_SEQ_LEN);
            let input_ids = &encoding.get_ids()[..seq_len];
            let attention_mask = &encoding.get_attention_mask()[..seq_len];

            let ids: Vec<i64> = input_ids.iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = attention_mask.iter().map(|&m| m as i64).collect();
            let type_ids = vec![0i64; seq_len];

            let ids = Tensor::from_array(([1usize, seq_len], ids)).map_err(inference_err("ids tensor"))?;
            let mask_t =
                Tensor::from_array(([1usize, seq_len], mask)).map_err(inference_err("mask tensor"))?;
            let types = Tensor::from_array(([1usize, seq_len], type_ids))
                .map_err(inference_err("type_ids tensor"))?;

            let mut session = self.session.lock();
            let outputs = session
                .run(ort::inputs![ids, mask_t, types])
                .map_err(inference_err("ONNX inference failed"))?;

            // [1, seq_len, dim] token embeddings need mean pooling;
            // [1, dim] is already pooled.
            let (shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(inference_err("Failed to extract output tensor"))?;
            let dims: Vec<i64> = shape.iter().copied().collect();

            let mut embedding = match dims.len() {
                3 => {
                    let dim = dims[2] as usize;
                    let mut pooled = Array1::<f32>::zeros(dim);
                    let mut count = 0.0f32;
                    for (i, &m) in attention_mask.iter().enumerate() {
                        if m > 0 {
                            let offset = i * dim;
                            for d in 0..dim {
                                pooled[d] += data[offset + d];
                            }
                            count += 1.0;
                        }
                    }
                    if count == 0.0 {
                        return Ok(Array1::zeros(self.dimension));
                    }
                    pooled / count
                }
                2 => Array1::from_vec(data[..dims[1] as usize].to_vec()),
                _ => {
                    return Err(Error::Inference(format!("Unexpected output shape: {:?}", dims)));
                }
            };

            let norm = embedding.dot(&embedding).sqrt();
            if norm > 0.0 {
                embedding /= norm;
            }
            Ok(embedding)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> String {
            self.name.clone()
        }
    }
}

#[cfg(feature = "onnx")]
pub use inner::OnnxEmbedder;

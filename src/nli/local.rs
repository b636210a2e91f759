//! Local ONNX cross-encoder NLI provider.
//!
//! Runs a MiniLM-class NLI cross-encoder via `ort`. The model takes a
//! tokenized sentence pair and emits three logits ordered
//! [contradiction, entailment, neutral]; softmax over them gives the class
//! probabilities.

use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{NliProvider, NliVerdict};
use crate::config::NliConfig;

/// Cross-encoders tolerate longer inputs than the embedding model; pairs are
/// truncated jointly.
const MAX_SEQ_LEN: usize = 512;

/// Index of the contradiction class in the model's output logits.
const CONTRADICTION_CLASS: usize = 0;

pub struct LocalNliProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
unsafe impl Send for LocalNliProvider {}
unsafe impl Sync for LocalNliProvider {}

impl LocalNliProvider {
    pub fn new(config: &NliConfig) -> Result<Self> {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        let model_path = cache_dir.join("model.onnx");
        let tokenizer_path = cache_dir.join("tokenizer.json");

        anyhow::ensure!(
            model_path.exists(),
            "NLI model not found at {}. Run `engram model download --nli` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "NLI tokenizer not found at {}. Run `engram model download --nli` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(&model_path)
            .context("failed to load NLI ONNX model")?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load NLI tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tracing::info!(model = %model_path.display(), "NLI model loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn run_pair(&self, premise: &str, hypothesis: &str) -> Result<NliVerdict> {
        let encoding = self
            .tokenizer
            .encode((premise, hypothesis), true)
            .map_err(|e| anyhow::anyhow!("NLI tokenization failed: {e}"))?;

        let seq_len = encoding.get_ids().len();
        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let shape = vec![1i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.into_boxed_slice()))?;
        let token_type_ids_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("NLI session lock poisoned: {e}"))?;

        let outputs = session.run(ort::inputs! {
            "input_ids" => input_ids_tensor,
            "attention_mask" => attention_mask_tensor,
            "token_type_ids" => token_type_ids_tensor,
        })?;

        let (dims, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("failed to extract NLI logits")?;

        let dims: &[i64] = &dims;
        anyhow::ensure!(
            dims.len() == 2 && dims[1] == 3,
            "unexpected NLI logits shape: {dims:?}, expected [1, 3]"
        );

        let probs = softmax(&logits[..3]);
        let contradiction = probs[CONTRADICTION_CLASS] as f64;
        let is_contradiction = probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i == CONTRADICTION_CLASS)
            .unwrap_or(false);

        Ok(NliVerdict {
            is_contradiction,
            confidence: contradiction,
        })
    }
}

#[async_trait]
impl NliProvider for LocalNliProvider {
    async fn check(&self, premise: &str, hypothesis: &str) -> Result<NliVerdict> {
        // Inference is CPU-bound and the session lock is sync; keep it off
        // the async executor the same way the embedding provider is used.
        let premise = premise.to_string();
        let hypothesis = hypothesis.to_string();
        // run_pair borrows self, so block in place rather than spawn_blocking
        tokio::task::block_in_place(|| self.run_pair(&premise, &hypothesis))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&x| x / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn softmax_is_stable_for_large_logits() {
        let probs = softmax(&[1000.0, 1000.0, 1000.0]);
        for p in &probs {
            assert!((p - 1.0 / 3.0).abs() < 1e-5);
        }
    }
}

//! Natural-language-inference provider.
//!
//! The contradiction detector's last tier asks an NLI cross-encoder whether a
//! candidate pair contradicts. The provider is strictly advisory: failures are
//! caught by the detector and treated as "no additional signal".

pub mod local;

use anyhow::Result;
use async_trait::async_trait;

/// Verdict from an NLI check on an ordered text pair.
#[derive(Debug, Clone, Copy)]
pub struct NliVerdict {
    pub is_contradiction: bool,
    /// Model probability mass on the contradiction class, in `[0, 1]`.
    pub confidence: f64,
}

/// Trait for pairwise contradiction classification.
#[async_trait]
pub trait NliProvider: Send + Sync {
    /// Classify whether `premise` and `hypothesis` contradict each other.
    async fn check(&self, premise: &str, hypothesis: &str) -> Result<NliVerdict>;
}

/// Create an NLI provider from config, or `None` when disabled.
pub fn create_provider(
    config: &crate::config::NliConfig,
) -> Result<Option<Box<dyn NliProvider>>> {
    if !config.enabled {
        return Ok(None);
    }
    let provider = local::LocalNliProvider::new(config)?;
    Ok(Some(Box::new(provider)))
}

//! Tiered model construction
//!
//! The orchestration core uses two model tiers sharing one provider key:
//! a fast model for triage and quick responses, a deep model for prompted
//! reasoning. A missing key disables both tiers; the caller degrades to
//! rule-only operation.

use std::sync::Arc;
use std::time::Duration;

use redi_core::LanguageModel;

use crate::backend::{HttpLanguageModel, LlmSettings};
use crate::LlmError;

/// The two model tiers
#[derive(Clone)]
pub struct ModelTiers {
    pub fast: Arc<dyn LanguageModel>,
    pub deep: Arc<dyn LanguageModel>,
}

/// Build both tiers, or `None` when no API key is configured.
pub fn build_tiers(
    api_key: Option<&str>,
    endpoint: &str,
    fast_model: &str,
    deep_model: &str,
) -> Result<Option<ModelTiers>, LlmError> {
    let Some(api_key) = api_key.filter(|k| !k.is_empty()) else {
        tracing::warn!("LLM tiers disabled: no API key");
        return Ok(None);
    };

    let fast = HttpLanguageModel::new(
        LlmSettings::new(api_key, endpoint, fast_model).with_timeout(Duration::from_secs(10)),
    )?;
    let deep = HttpLanguageModel::new(
        LlmSettings::new(api_key, endpoint, deep_model).with_timeout(Duration::from_secs(30)),
    )?;

    tracing::info!(fast = fast_model, deep = deep_model, "LLM tiers initialized");
    Ok(Some(ModelTiers {
        fast: Arc::new(fast),
        deep: Arc::new(deep),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_disables_tiers() {
        assert!(build_tiers(None, "http://x", "f", "d").unwrap().is_none());
        assert!(build_tiers(Some(""), "http://x", "f", "d")
            .unwrap()
            .is_none());
    }

    #[test]
    fn tiers_carry_configured_model_names() {
        let tiers = build_tiers(Some("key"), "http://x", "fast-1", "deep-1")
            .unwrap()
            .unwrap();
        assert_eq!(tiers.fast.model_name(), "fast-1");
        assert_eq!(tiers.deep.model_name(), "deep-1");
    }
}

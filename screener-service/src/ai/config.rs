//! Immutable completion configuration snapshots.
//!
//! Every judgment binds one `AiConfig` at call time. Request-level overrides
//! produce a new value through [`AiConfig::update`]; the base settings loaded
//! at startup are never touched.

use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

use screener_common::util::mask_secret;
use screener_common::{AiSettings, Error, Result};

/// Effective settings for one completion call.
#[derive(Clone, PartialEq)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_name: String,
    pub temperature: f64,
    pub timeout: Duration,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Partial override carried by a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AiConfigPatch {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default, alias = "api_url")]
    pub base_url: Option<String>,

    #[serde(default, alias = "ai_model")]
    pub model_name: Option<String>,

    #[serde(default)]
    pub temperature: Option<f64>,
}

impl AiConfig {
    /// Build the base snapshot from the `ai` config section.
    pub fn from_settings(settings: &AiSettings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            model_name: settings.model_name.clone(),
            temperature: settings.temperature,
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    /// Human-readable names of required fields that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.trim().is_empty() {
            missing.push("API密钥");
        }
        if self.base_url.trim().is_empty() {
            missing.push("API基础地址");
        }
        if self.model_name.trim().is_empty() {
            missing.push("模型名称");
        }
        missing
    }

    /// Fail with `InvalidInput` when a required field is empty.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidInput(format!(
                "AI配置不完整，缺少: {}",
                missing.join(", ")
            )))
        }
    }

    /// Return a new snapshot with the patch applied.
    pub fn update(&self, patch: &AiConfigPatch) -> Self {
        let mut next = self.clone();
        if let Some(key) = &patch.api_key {
            next.api_key = key.trim().to_string();
        }
        if let Some(url) = &patch.base_url {
            next.base_url = url.trim().to_string();
        }
        if let Some(model) = &patch.model_name {
            next.model_name = model.trim().to_string();
        }
        if let Some(temperature) = patch.temperature {
            next.temperature = temperature;
        }

        let missing = next.missing_fields();
        if !missing.is_empty() {
            warn!(missing = %missing.join(", "), "AI config is incomplete after update");
        }
        next
    }

    /// Apply an optional patch.
    pub fn with_patch(&self, patch: Option<&AiConfigPatch>) -> Self {
        match patch {
            Some(p) => self.update(p),
            None => self.clone(),
        }
    }
}

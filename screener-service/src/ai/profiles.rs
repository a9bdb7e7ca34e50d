//! Risk-profile personas and strategy descriptors used in strategy prompts.
//!
//! The catalog is built once at startup and shared read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use screener_common::Result;

/// Risk appetite requested by a strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    /// Parse a preference; anything unrecognised is treated as medium.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Self::Low,
            "high" => Self::High,
            _ => Self::Medium,
        }
    }

    /// Catalog key, e.g. `low_risk`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Low => "low_risk",
            Self::Medium => "medium_risk",
            Self::High => "high_risk",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Persona text for one risk level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub name: String,
    pub description: String,
}

impl RiskProfile {
    fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Read-only catalog keyed `low_risk | medium_risk | high_risk`.
#[derive(Debug, Clone)]
pub struct RiskProfileCatalog {
    profiles: HashMap<String, RiskProfile>,
}

fn balanced() -> RiskProfile {
    RiskProfile::new(
        "中风险",
        "你是一名稳健平衡型的股票分析师。你在收益和风险之间寻求平衡，\
         愿意为合理的回报承担适度波动，既关注趋势延续也重视止损纪律，\
         只有在信号较为明确时才建议参与交易。",
    )
}

impl RiskProfileCatalog {
    /// Built-in personas.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "low_risk".to_string(),
            RiskProfile::new(
                "低风险",
                "你是一名保守谨慎的股票分析师。你把本金安全放在首位，\
                 偏好波动小、走势平稳的标的，对任何不确定信号都保持怀疑，\
                 宁可错过机会也不愿承担较大回撤。",
            ),
        );
        profiles.insert("medium_risk".to_string(), balanced());
        profiles.insert(
            "high_risk".to_string(),
            RiskProfile::new(
                "高风险",
                "你是一名积极进取的股票分析师。你追求较高收益，\
                 愿意在趋势初期或突破时果断介入，能够接受较大的价格波动，\
                 重视量价配合带来的短线机会。",
            ),
        );
        Self { profiles }
    }

    /// Load `*.json` files from `dir`, keyed by file stem.
    ///
    /// Files that fail to parse are skipped. An empty result falls back to
    /// the built-in personas.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut profiles = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let parsed = fs::read_to_string(&path)
                .map_err(screener_common::Error::from)
                .and_then(|text| Ok(serde_json::from_str::<RiskProfile>(&text)?));
            match parsed {
                Ok(profile) => {
                    debug!(key, path = %path.display(), "Loaded risk profile");
                    profiles.insert(key.to_string(), profile);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable risk profile");
                }
            }
        }

        if profiles.is_empty() {
            info!(dir = %dir.display(), "No risk profiles found, using built-in catalog");
            return Ok(Self::builtin());
        }
        Ok(Self { profiles })
    }

    /// Build from the optional configured directory, degrading to built-ins.
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => Self::load(dir).unwrap_or_else(|e| {
                warn!(dir = %dir.display(), error = %e, "Failed to read risk profiles, using built-in catalog");
                Self::builtin()
            }),
            None => Self::builtin(),
        }
    }

    /// Profile for `level`, or the balanced persona when absent.
    pub fn get(&self, level: RiskLevel) -> RiskProfile {
        self.profiles
            .get(level.key())
            .cloned()
            .unwrap_or_else(balanced)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for RiskProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ============================================================================
// Strategy Descriptors
// ============================================================================

/// Sentence describing how strongly to react to trend signals.
pub fn trend_sensitivity_text(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "low" => "对趋势变化反应迟缓，只在趋势非常明确并经过多日确认后才调整判断。",
        "high" => "对趋势变化高度敏感，捕捉到早期拐点信号即可调整判断。",
        _ => "对趋势变化保持适度敏感，需要量价等多个信号相互印证后再调整判断。",
    }
}

/// Sentence describing the directional preference.
pub fn bias_text(bias: &str) -> &'static str {
    match bias.trim().to_lowercase().as_str() {
        "long" => "整体偏向做多，在信号模糊时更倾向于寻找买入机会。",
        "short" => "整体偏向做空或规避，在信号模糊时更倾向于减仓或观望。",
        _ => "保持中性立场，不预设多空方向，完全依据数据判断。",
    }
}

//! Message-based classification of completion failures.

use serde::Serialize;

use super::config::AiConfig;

/// User-facing failure category for a completion error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Auth,
    ModelNotFound,
    RateLimit,
    Server,
    Forbidden,
    ContextLength,
    Unknown,
}

/// Keyword table, checked in order against the lowercased message.
const KEYWORDS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Network,
        &["network", "timeout", "connection", "connect", "socket", "dns", "refused"],
    ),
    (
        ErrorCategory::Auth,
        &["401", "unauthorized", "invalid api key", "api key", "authentication"],
    ),
    (
        ErrorCategory::ModelNotFound,
        &["404", "not found", "model does not exist", "invalid model"],
    ),
    (
        ErrorCategory::RateLimit,
        &["429", "rate limit", "too many requests"],
    ),
    (
        ErrorCategory::Server,
        &["500", "server error", "internal error"],
    ),
    (ErrorCategory::Forbidden, &["403", "forbidden", "access denied"]),
    (
        ErrorCategory::ContextLength,
        &["context length", "token limit", "max tokens", "context window"],
    ),
];

impl ErrorCategory {
    /// Classify an error message. Earlier categories win on overlap.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(category, _)| *category)
            .unwrap_or(Self::Unknown)
    }

    /// Short label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network => "网络连接错误",
            Self::Auth => "认证失败",
            Self::ModelNotFound => "模型不存在",
            Self::RateLimit => "请求频率超限",
            Self::Server => "AI服务端错误",
            Self::Forbidden => "访问被拒绝",
            Self::ContextLength => "上下文长度超限",
            Self::Unknown => "未知错误",
        }
    }

    /// Actionable description mentioning the settings in use.
    pub fn describe(&self, config: &AiConfig, message: &str) -> String {
        let hint = match self {
            Self::Network => format!(
                "无法连接到 {}，请检查网络连接和API地址是否可达",
                config.base_url
            ),
            Self::Auth => "API密钥无效或已过期，请检查API密钥配置".to_string(),
            Self::ModelNotFound => format!(
                "模型 {} 不存在或接口地址错误，请确认模型名称和API地址",
                config.model_name
            ),
            Self::RateLimit => "请求过于频繁或额度不足，请稍后重试".to_string(),
            Self::Server => "AI服务暂时不可用，请稍后重试".to_string(),
            Self::Forbidden => "当前API密钥没有访问该模型的权限".to_string(),
            Self::ContextLength => "输入内容过长，请缩短日期范围或减少数据量".to_string(),
            Self::Unknown => "请检查AI配置后重试".to_string(),
        };
        format!("{}: {}。原始错误: {}", self.label(), hint, message)
    }
}

//! Rule and AI screening batches against scripted providers.

use async_trait::async_trait;
use chrono::{Datelike, Duration as Days, NaiveDate, Weekday};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use screener_common::AiSettings;
use screener_service::ai::{
    AiAnalyzer, AiConfig, AiConfigPatch, CompletionError, CompletionProvider, RiskProfileCatalog,
    StrategyConfig,
};
use screener_service::data::{
    HistoryProvider, HistoryQuery, MarketDirectory, ProviderError, RawRow, StockBasic,
};
use screener_service::fetcher::HistoryFetcher;
use screener_service::screener::{
    AiScreenRequest, Judgment, RuleScreenRequest, ScreeningRule, ScreeningService,
};

// ============================================================================
// Fakes
// ============================================================================

/// Answers every symbol with 40 rising weekday bars; close ends near 14.
struct RisingHistory {
    calls: AtomicU32,
}

#[async_trait]
impl HistoryProvider for RisingHistory {
    fn name(&self) -> &'static str {
        "rising"
    }

    async fn query(&self, _query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut rows = Vec::new();
        while rows.len() < 40 {
            if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                let close = 10.0 + rows.len() as f64 * 0.1;
                rows.push(RawRow {
                    date,
                    open: Some(close - 0.05),
                    close: Some(close),
                    high: Some(close + 0.1),
                    low: Some(close - 0.1),
                    volume: Some(3_000_000.0),
                    turnover: Some(2.0),
                });
            }
            date += Days::days(1);
        }
        Ok(rows)
    }
}

/// Never answers before the fetch deadline.
struct StalledHistory;

#[async_trait]
impl HistoryProvider for StalledHistory {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn query(&self, _query: &HistoryQuery) -> Result<Vec<RawRow>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(600)).await;
        Ok(Vec::new())
    }
}

struct Listing {
    symbols: Vec<String>,
}

#[async_trait]
impl MarketDirectory for Listing {
    async fn stock_basic(&self, symbol: &str) -> Result<StockBasic, ProviderError> {
        match symbol {
            "sh600000" => Ok(StockBasic {
                symbol: symbol.to_string(),
                name: "浦发银行".into(),
                industry: "银行".into(),
                area: "上海".into(),
                market: "A股".into(),
            }),
            _ => Err(ProviderError::DataNotAvailable(symbol.to_string())),
        }
    }

    async fn list_symbols(
        &self,
        _market: &str,
        _exchange: Option<&str>,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(self.symbols.clone())
    }
}

/// Replies by prompt kind and remembers the models it was called with.
#[derive(Default)]
struct ScriptedModel {
    judgments: AtomicU32,
    explanations: AtomicU32,
    models: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn judgments(&self) -> u32 {
        self.judgments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for ScriptedModel {
    async fn complete(&self, config: &AiConfig, prompt: &str) -> Result<String, CompletionError> {
        self.models.lock().unwrap().push(config.model_name.clone());

        if prompt.contains("选股的查询和结果") {
            self.explanations.fetch_add(1, Ordering::SeqCst);
            return Ok("explained".to_string());
        }
        if prompt.contains("转换成结构化规则") {
            return Ok(r#"[{"indicator": "close", "operator": ">", "value": 1e9}]"#.to_string());
        }

        self.judgments.fetch_add(1, Ordering::SeqCst);
        let strategy = prompt.contains("will_trade");
        let reply = if prompt.contains("sh600000") {
            if strategy {
                "```json\n{\"action\": \"买入\", \"trend\": \"上涨\", \"will_trade\": true, \"confidence\": 0.9}\n```"
            } else {
                "```json\n{\"meets_conditions\": true, \"analysis_reason\": \"放量上涨\", \"risk_warning\": \"追高\"}\n```"
            }
        } else if prompt.contains("sz000001") {
            if strategy {
                "{\"action\": \"持有\", \"will_trade\": false}"
            } else {
                "{\"meets_conditions\": false, \"analysis_reason\": \"缩量\", \"risk_warning\": \"无\"}"
            }
        } else {
            "I cannot answer that in JSON."
        };
        Ok(reply.to_string())
    }
}

struct Harness {
    history: Arc<RisingHistory>,
    model: Arc<ScriptedModel>,
    service: ScreeningService,
}

fn harness(listing: Vec<String>) -> Harness {
    let history = Arc::new(RisingHistory {
        calls: AtomicU32::new(0),
    });
    let model = Arc::new(ScriptedModel::default());
    let fetcher = HistoryFetcher::new(history.clone(), history.clone(), history.clone());
    let analyzer = AiAnalyzer::new(model.clone(), Arc::new(RiskProfileCatalog::builtin()));
    let service = ScreeningService::new(
        fetcher,
        Arc::new(Listing { symbols: listing }),
        analyzer,
        vec!["sh600000".into()],
        180,
    );
    Harness {
        history,
        model,
        service,
    }
}

fn listing(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sh{}", 601000 + i)).collect()
}

fn base_config() -> AiConfig {
    AiConfig::from_settings(&AiSettings {
        api_key: "sk-test".into(),
        ..AiSettings::default()
    })
}

fn rule_request(symbols: Option<Vec<&str>>, rules: Vec<ScreeningRule>) -> RuleScreenRequest {
    RuleScreenRequest {
        symbols: symbols.map(|s| s.into_iter().map(String::from).collect()),
        start_date: None,
        end_date: None,
        rules,
        market: "cn".into(),
        exchange: None,
    }
}

fn ai_request(symbols: Option<Vec<&str>>) -> AiScreenRequest {
    serde_json::from_value(serde_json::json!({
        "query": "近期放量上涨",
        "symbols": symbols,
    }))
    .unwrap()
}

// ============================================================================
// Rule Screening
// ============================================================================

#[tokio::test]
async fn test_unreachable_close_matches_nothing() {
    let h = harness(listing(10));
    let result = h
        .service
        .rule_screen(rule_request(None, vec![ScreeningRule::new("close", ">", 1e9)]))
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert!(result.stocks.is_empty());
    assert_eq!(result.request.rules[0].value, 1e9);
}

#[tokio::test]
async fn test_rule_matches_keep_input_order_and_degrade_basic_info() {
    let h = harness(vec![]);
    let result = h
        .service
        .rule_screen(rule_request(
            Some(vec!["sz000001", "sh600000"]),
            vec![
                ScreeningRule::new("close", ">", 5.0),
                ScreeningRule::new("volume", ">=", 3_000_000.0),
                ScreeningRule::new("pe_ratio", "<", 1.0),
            ],
        ))
        .await
        .unwrap();

    assert_eq!(result.total, 2);
    assert_eq!(result.stocks[0].symbol, "sz000001");
    assert_eq!(result.stocks[0].name, "");
    assert_eq!(result.stocks[0].market, "A股");
    assert_eq!(result.stocks[1].name, "浦发银行");
}

#[tokio::test]
async fn test_rule_screen_caps_listing_at_fifty() {
    let h = harness(listing(120));
    let result = h
        .service
        .rule_screen(rule_request(None, vec![ScreeningRule::new("close", ">", 0.0)]))
        .await
        .unwrap();

    assert_eq!(result.total, 50);
    assert_eq!(h.history.calls.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_negated_rule_flips_match() {
    let h = harness(vec![]);
    let holds = h
        .service
        .rule_screen(rule_request(
            Some(vec!["sh600000"]),
            vec![ScreeningRule::new("close", ">", 12.0)],
        ))
        .await
        .unwrap();
    let negated = h
        .service
        .rule_screen(rule_request(
            Some(vec!["sh600000"]),
            vec![ScreeningRule::new("close", "<=", 12.0)],
        ))
        .await
        .unwrap();

    assert_eq!(holds.total, 1);
    assert_eq!(negated.total, 0);
}

// ============================================================================
// AI Screening
// ============================================================================

#[tokio::test]
async fn test_condition_screen_tolerates_fences_and_garbage() {
    let h = harness(vec![]);
    let result = h
        .service
        .ai_screen(&base_config(), ai_request(Some(vec!["sh600000", "sz000001", "sh600036"])))
        .await
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.stocks[0].symbol, "sh600000");
    assert_eq!(result.stocks[0].analysis.as_deref(), Some("放量上涨"));
    assert_eq!(result.stocks[0].risk_warning.as_deref(), Some("追高"));
    assert_eq!(result.analysis_results.len(), 3);
    assert!(!result.analysis_results[2].is_match());
    match &result.analysis_results[2] {
        Judgment::Condition(v) => assert!(v.analysis_reason.contains("I cannot answer")),
        Judgment::Strategy(_) => panic!("expected a condition verdict"),
    }
    assert_eq!(result.explanation, "explained");
    assert_eq!(h.model.explanations.load(Ordering::SeqCst), 1);
    assert!(result.rules.is_none());
    assert!(result.synthetic_symbols.is_empty());
}

#[tokio::test]
async fn test_ai_screen_caps_listing_at_thirty() {
    let h = harness(listing(120));
    let result = h
        .service
        .ai_screen(&base_config(), ai_request(None))
        .await
        .unwrap();

    assert_eq!(result.analysis_results.len(), 30);
    assert_eq!(h.model.judgments(), 30);
    assert_eq!(result.total, 0);
}

#[tokio::test]
async fn test_strategy_screen_matches_on_will_trade() {
    let h = harness(vec![]);
    let mut request = ai_request(Some(vec!["sz000001", "sh600000"]));
    request.strategy = Some(StrategyConfig {
        risk_preference: "high".into(),
        ..StrategyConfig::default()
    });

    let result = h.service.ai_screen(&base_config(), request).await.unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.stocks[0].symbol, "sh600000");
    assert!(result.stocks[0]
        .analysis
        .as_deref()
        .is_some_and(|a| a.starts_with("买入 / 上涨")));
    match &result.analysis_results[1] {
        Judgment::Strategy(v) => {
            assert!(v.will_trade);
            assert_eq!(v.confidence, 0.9);
        }
        Judgment::Condition(_) => panic!("expected a strategy verdict"),
    }
}

#[tokio::test]
async fn test_converted_rules_are_informational() {
    let h = harness(vec![]);
    let mut request = ai_request(Some(vec!["sh600000"]));
    request.convert_rules = true;

    let result = h.service.ai_screen(&base_config(), request).await.unwrap();

    let rules = result.rules.unwrap();
    assert_eq!(rules, vec![ScreeningRule::new("close", ">", 1e9)]);
    assert_eq!(result.total, 1);
}

#[tokio::test]
async fn test_request_patch_applies_to_every_call() {
    let h = harness(vec![]);
    let base = base_config();
    let mut request = ai_request(Some(vec!["sh600000", "sz000001"]));
    request.ai_config = Some(AiConfigPatch {
        model_name: Some("custom-model".into()),
        ..AiConfigPatch::default()
    });

    h.service.ai_screen(&base, request).await.unwrap();

    let models = h.model.models.lock().unwrap().clone();
    assert_eq!(models.len(), 3);
    assert!(models.iter().all(|m| m == "custom-model"));
    assert_eq!(base.model_name, "gpt-3.5-turbo");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_degraded_symbols_are_flagged() {
    let stalled = Arc::new(StalledHistory);
    let fetcher = HistoryFetcher::new(stalled.clone(), stalled.clone(), stalled)
        .with_deadline(Duration::from_millis(100));
    let model = Arc::new(ScriptedModel::default());
    let service = ScreeningService::new(
        fetcher,
        Arc::new(Listing { symbols: vec![] }),
        AiAnalyzer::new(model, Arc::new(RiskProfileCatalog::builtin())),
        vec![],
        180,
    );

    let result = service
        .ai_screen(&base_config(), ai_request(Some(vec!["sh600000"])))
        .await
        .unwrap();

    assert_eq!(result.synthetic_symbols, vec!["sh600000"]);
    assert_eq!(result.analysis_results.len(), 1);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["synthetic_symbols"][0], "sh600000");
}

//! Prompt builders for the completion capability.

/// Per-symbol condition judgment.
pub fn condition_prompt(
    symbol: &str,
    features_json: &str,
    bars_json: &str,
    days: usize,
    condition: &str,
) -> String {
    format!(
        r#"你是一名A股技术面分析师。请根据下面提供的特征指标和近期日线数据，判断这只股票是否满足用户给出的条件。

## 股票
{symbol}

## 特征指标
{features_json}

## 最近{days}个交易日
{bars_json}

## 用户条件
{condition}

## 分析要点
1. 观察这段时间内价格、成交量、换手率与K线形态的变化
2. 从量价配合推断资金进出和筹码的集中或分散
3. 推测主力与散户行为在这段时间的变化
4. 只依据数据严格判断是否满足条件

只输出一个JSON对象，不要附加其他文字：
```json
{{
  "stock": "{symbol}",
  "meets_conditions": true,
  "analysis_reason": "判断依据",
  "risk_warning": "主要风险"
}}
```"#
    )
}

/// Inputs for the strategy-aware judgment prompt.
pub struct StrategyPrompt<'a> {
    pub symbol: &'a str,
    pub features_json: &'a str,
    pub bars_json: &'a str,
    pub days: usize,
    pub persona: &'a str,
    pub trend_text: &'a str,
    pub bias_text: &'a str,
    pub risk_preference: &'a str,
    pub trend_sensitivity: &'a str,
    pub bias: &'a str,
}

/// Strategy-aware per-symbol judgment.
pub fn strategy_prompt(p: &StrategyPrompt<'_>) -> String {
    format!(
        r#"{persona}
{trend_text}
{bias_text}

请结合下面的特征指标、近期日线数据和交易策略，对这只股票给出操作判断。

## 股票
{symbol}

## 特征指标
{features_json}

## 最近{days}个交易日
{bars_json}

## 策略参数
- 风险偏好: {risk_preference}
- 趋势敏感度: {trend_sensitivity}
- 多空偏好: {bias}

## 输出要求
1. 操作只能是 买入、卖出 或 持有，趋势只能是 多头、空头 或 震荡
2. confidence 取值 0 到 1，表示判断的把握程度
3. expected_return 为预期涨跌幅，上涨为正，下跌为负
4. will_trade 表示按当前策略是否会实际交易
5. 估算支撑区间和压力区间时，把成交量与换手率乘积 (volume_turnover_product) 较高的价位作为重要参考
6. 列出至少3个历史上的相似走势，说明当时的K线特征和后续涨跌

只输出一个JSON对象，不要附加其他文字：
```json
{{
  "symbol": "{symbol}",
  "action": "持有",
  "trend": "震荡",
  "logic": "决策依据",
  "confidence": 0.5,
  "expected_return": 0.0,
  "will_trade": false,
  "support_level": "10.0-10.5",
  "resistance_level": "11.8-12.2",
  "historical_similar_patterns": [
    {{"pattern_date": "YYYY-MM-DD", "kline_segment": "K线特征", "result": "上涨", "return": 0.05, "similarity": 0.8}}
  ],
  "detailed_analysis": {{
    "price_analysis": "",
    "volume_analysis": "",
    "turnover_analysis": "",
    "volume_turnover_analysis": "",
    "kline_pattern_analysis": "",
    "support_resistance_analysis": ""
  }}
}}
```"#,
        persona = p.persona,
        trend_text = p.trend_text,
        bias_text = p.bias_text,
        symbol = p.symbol,
        features_json = p.features_json,
        days = p.days,
        bars_json = p.bars_json,
        risk_preference = p.risk_preference,
        trend_sensitivity = p.trend_sensitivity,
        bias = p.bias,
    )
}

/// Natural-language query to rule list.
pub fn rules_prompt(query: &str) -> String {
    format!(
        r#"把下面的股票筛选描述转换成结构化规则。

描述: {query}

每条规则包含 indicator、operator、value 三个字段：
- indicator 取 open、close、high、low、volume、turnover 之一
- operator 取 >、<、>=、<=、== 之一
- value 为数字

示例：描述 "收盘价高于50元且成交量超过500万" 对应
[{{"indicator": "close", "operator": ">", "value": 50}}, {{"indicator": "volume", "operator": ">", "value": 5000000}}]

只输出JSON数组，无法转换时输出 []。"#
    )
}

/// Narrative explanation of an aggregate screening result.
pub fn explain_prompt(query: &str, result_json: &str) -> String {
    format!(
        r#"你是一名股票研究员。下面是一次选股的查询和结果，请写一段面向投资者的解读。

## 查询
{query}

## 筛选结果
{result_json}

请依次说明：
1. 查询条件的含义
2. 入选股票的数量和整体特征
3. 重点个股的简要点评（数量较多时挑选前三只）
4. 操作建议与需要注意的风险

语言客观克制，不做夸大承诺。"#
    )
}

/// Connectivity probe.
pub const PROBE_PROMPT: &str = "Hello, are you available?";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condition_prompt_embeds_inputs() {
        let prompt = condition_prompt("sh600000", "{\"a\":1}", "[]", 10, "放量突破");
        assert!(prompt.contains("sh600000"));
        assert!(prompt.contains("最近10个交易日"));
        assert!(prompt.contains("放量突破"));
        assert!(prompt.contains("\"meets_conditions\""));
    }

    #[test]
    fn test_strategy_prompt_embeds_persona() {
        let prompt = strategy_prompt(&StrategyPrompt {
            symbol: "sz000001",
            features_json: "{}",
            bars_json: "[]",
            days: 30,
            persona: "PERSONA",
            trend_text: "TREND",
            bias_text: "BIAS",
            risk_preference: "high",
            trend_sensitivity: "low",
            bias: "long",
        });
        assert!(prompt.starts_with("PERSONA\nTREND\nBIAS"));
        assert!(prompt.contains("风险偏好: high"));
        assert!(prompt.contains("\"will_trade\""));
    }

    #[test]
    fn test_rules_prompt_has_literal_braces() {
        let prompt = rules_prompt("高换手");
        assert!(prompt.contains("{\"indicator\": \"close\""));
        assert!(prompt.contains("高换手"));
    }
}

use serde::{Deserialize, Serialize};

/// 单个证券在某一时刻的完整行情快照
///
/// 所有字段来自同一次原子抓取响应，`symbol` 是唯一的身份键。
/// `timestamp` 为抓取时间（Unix毫秒），同一代码的新记录不会被更旧的记录覆盖。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub day_high: f64,
    pub day_low: f64,
    pub year_high: f64,
    pub year_low: f64,
    pub volume: i64,
    pub avg_volume: i64,
    pub fifty_day_average: f64,
    pub two_hundred_day_average: f64,
    pub market_cap: i64,
    pub exchange: String,
    pub open: f64,
    pub previous_close: f64,
    pub eps: f64,
    pub pe: f64,
    pub earnings_timestamp: Option<i64>,
    pub shares_outstanding: i64,
    pub timestamp: i64,
}

impl Quote {
    /// 创建只包含代码、价格和时间戳的行情，其余字段取默认值
    pub fn new(symbol: &str, price: f64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            price,
            timestamp,
            ..Default::default()
        }
    }

    /// 是否可以覆盖已有记录（时间戳不早于已有记录）
    pub fn supersedes(&self, existing: &Quote) -> bool {
        self.timestamp >= existing.timestamp
    }
}

/// 规范化股票代码：去除空白并转为大写
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// 规范化并去重，保持首次出现的顺序
pub fn normalize_symbols<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = normalize_symbol(symbol.as_ref());
        if !symbol.is_empty() && !result.contains(&symbol) {
            result.push(symbol);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_or_equal_timestamp_supersedes() {
        let old = Quote::new("AAPL", 150.0, 1_000);
        let new = Quote::new("AAPL", 151.0, 2_000);
        assert!(new.supersedes(&old));
        assert!(!old.supersedes(&new));
        assert!(old.supersedes(&old.clone()));
    }

    #[test]
    fn symbols_are_normalized_in_order() {
        let symbols = normalize_symbols(&[" aapl", "MSFT", "AAPL", "", "tsla "]);
        assert_eq!(symbols, vec!["AAPL", "MSFT", "TSLA"]);
    }
}

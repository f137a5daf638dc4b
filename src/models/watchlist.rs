use crate::models::quote::Quote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 自选列表中的一项：代码及最近一次解析到的行情
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub quote: Option<Quote>,
}

/// 有序的自选列表，插入顺序即展示顺序
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Watchlist {
    pub entries: Vec<WatchlistEntry>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按成员顺序把存储快照中的行情连接到每个代码上
    pub fn from_snapshot(symbols: &[String], snapshot: &BTreeMap<String, Quote>) -> Self {
        let entries = symbols
            .iter()
            .map(|symbol| WatchlistEntry {
                symbol: symbol.clone(),
                quote: snapshot.get(symbol).cloned(),
            })
            .collect();
        Self { entries }
    }

    /// 由一组已解析的行情构建列表，保持给定顺序
    pub fn from_quotes(quotes: Vec<Quote>) -> Self {
        let entries = quotes
            .into_iter()
            .map(|quote| WatchlistEntry {
                symbol: quote.symbol.clone(),
                quote: Some(quote),
            })
            .collect();
        Self { entries }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.symbol.clone()).collect()
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.entries
            .iter()
            .find(|e| e.symbol == symbol)
            .and_then(|e| e.quote.as_ref())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.iter().any(|e| e.symbol == symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 已有行情的条目数量
    pub fn resolved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.quote.is_some()).count()
    }
}

pub mod http;

use crate::errors::DataError;
use crate::models::quote::Quote;
use async_trait::async_trait;

pub use http::HttpQuoteProvider;

/// 单个代码的抓取失败
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: DataError,
}

/// 一次抓取的结果：已解析的行情和逐代码的失败
///
/// 响应中没有出现、也没有报告失败的代码视为"尚未刷新"。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteBatch {
    pub quotes: Vec<Quote>,
    pub failures: Vec<SymbolFailure>,
}

impl QuoteBatch {
    pub fn new(quotes: Vec<Quote>) -> Self {
        Self {
            quotes,
            failures: Vec::new(),
        }
    }

    pub fn with_failure(mut self, symbol: &str, error: DataError) -> Self {
        self.failures.push(SymbolFailure {
            symbol: symbol.to_string(),
            error,
        });
        self
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Base trait for remote quote providers
#[async_trait]
pub trait QuoteProvider {
    /// Provider name used in logs
    fn provider_name(&self) -> &'static str;

    /// Fetch full quotes for the given symbols in one logical request.
    /// A total failure is returned as `Err`; per-symbol failures go in the batch.
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<QuoteBatch, DataError>;
}

use crate::config::Config;
use crate::errors::{DataError, NetworkError, QuoteHubError, Result};
use crate::models::quote::Quote;
use crate::provider::{QuoteBatch, QuoteProvider};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 基于HTTP的行情接口（Yahoo Finance v7 quote 格式）
pub struct HttpQuoteProvider {
    client: Client,
    base_url: String,
    batch_size: usize,
    min_request_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpQuoteProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .user_agent(concat!("quotehub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(QuoteHubError::RequestError)?;

        Ok(Self {
            client,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1),
            min_request_interval: config.min_request_interval,
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&self) {
        let now = Instant::now();
        let should_wait = match self.last_request.lock() {
            Ok(mut last) => {
                let wait = last.and_then(|instant| {
                    let elapsed = instant.elapsed();
                    (elapsed < self.min_request_interval).then(|| self.min_request_interval - elapsed)
                });
                *last = Some(now + wait.unwrap_or_default());
                wait
            }
            Err(_) => None,
        };

        if let Some(wait_time) = should_wait {
            debug!("Waiting {:?} to respect rate limit", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    /// 请求一批代码，返回已解析的行情和无法解析的代码
    async fn fetch_chunk(&self, symbols: &[String]) -> std::result::Result<(Vec<Quote>, Vec<String>), NetworkError> {
        self.wait_for_rate_limit().await;

        let captured_at = Utc::now().timestamp_millis();
        let response = self
            .client
            .get(format!("{}/v7/finance/quote", self.base_url))
            .query(&[("symbols", symbols.join(","))])
            .send()
            .await?;

        if let Some(kind) = NetworkError::from_status(response.status().as_u16()) {
            warn!("Quote request for {} failed: HTTP status {}", symbols.join(","), response.status());
            return Err(kind);
        }

        let text = response.text().await?;
        let json: Value = serde_json::from_str(&text)?;
        parse_quote_response(&json, captured_at)
    }
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    fn provider_name(&self) -> &'static str {
        "http"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> std::result::Result<QuoteBatch, DataError> {
        let mut batch = QuoteBatch::default();
        let mut first_error = None;

        for chunk in symbols.chunks(self.batch_size) {
            match self.fetch_chunk(chunk).await {
                Ok((quotes, malformed)) => {
                    batch.quotes.extend(quotes);
                    for symbol in malformed {
                        batch = batch.with_failure(&symbol, NetworkError::Serialization.into());
                    }
                }
                Err(kind) => {
                    first_error.get_or_insert(kind);
                    for symbol in chunk {
                        batch = batch.with_failure(symbol, kind.into());
                    }
                }
            }
        }

        // 一条行情都没有解析出来时视为整体失败
        if batch.quotes.is_empty() && !batch.failures.is_empty() {
            return Err(first_error.unwrap_or(NetworkError::Serialization).into());
        }

        info!(
            "Fetched {} quotes ({} failed) for {} symbols",
            batch.quotes.len(),
            batch.failures.len(),
            symbols.len()
        );
        Ok(batch)
    }
}

fn f64_field(item: &Value, key: &str) -> f64 {
    item.get(key).and_then(|v| v.as_f64()).unwrap_or_default()
}

fn i64_field(item: &Value, key: &str) -> i64 {
    item.get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or_default()
}

fn str_field(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(|v| v.as_str()))
        .unwrap_or_default()
        .to_string()
}

/// 解析 quoteResponse 报文，缺少价格的条目记为无法解析
pub fn parse_quote_response(
    json: &Value,
    captured_at: i64,
) -> std::result::Result<(Vec<Quote>, Vec<String>), NetworkError> {
    let results = json
        .get("quoteResponse")
        .and_then(|r| r.get("result"))
        .and_then(|r| r.as_array())
        .ok_or(NetworkError::Serialization)?;

    let mut quotes = Vec::with_capacity(results.len());
    let mut malformed = Vec::new();
    for item in results {
        let symbol = match item.get("symbol").and_then(|s| s.as_str()) {
            Some(s) => s.to_uppercase(),
            None => continue,
        };
        let price = match item.get("regularMarketPrice").and_then(|p| p.as_f64()) {
            Some(p) => p,
            None => {
                malformed.push(symbol);
                continue;
            }
        };

        quotes.push(Quote {
            name: str_field(item, &["longName", "shortName", "displayName"]),
            change: f64_field(item, "regularMarketChange"),
            change_percent: f64_field(item, "regularMarketChangePercent"),
            day_high: f64_field(item, "regularMarketDayHigh"),
            day_low: f64_field(item, "regularMarketDayLow"),
            year_high: f64_field(item, "fiftyTwoWeekHigh"),
            year_low: f64_field(item, "fiftyTwoWeekLow"),
            volume: i64_field(item, "regularMarketVolume"),
            avg_volume: i64_field(item, "averageDailyVolume3Month"),
            fifty_day_average: f64_field(item, "fiftyDayAverage"),
            two_hundred_day_average: f64_field(item, "twoHundredDayAverage"),
            market_cap: i64_field(item, "marketCap"),
            exchange: str_field(item, &["fullExchangeName", "exchange"]),
            open: f64_field(item, "regularMarketOpen"),
            previous_close: f64_field(item, "regularMarketPreviousClose"),
            eps: f64_field(item, "epsTrailingTwelveMonths"),
            pe: f64_field(item, "trailingPE"),
            // 接口返回秒
            earnings_timestamp: item
                .get("earningsTimestamp")
                .and_then(|v| v.as_i64())
                .map(|secs| secs * 1000),
            shares_outstanding: i64_field(item, "sharesOutstanding"),
            ..Quote::new(&symbol, price, captured_at)
        });
    }

    Ok((quotes, malformed))
}

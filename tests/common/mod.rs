#![allow(dead_code)]

use async_trait::async_trait;
use quotehub::provider::{QuoteBatch, QuoteProvider};
use quotehub::{DataError, Quote};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 可编程的行情接口，记录调用次数
#[derive(Default)]
pub struct FakeProvider {
    prices: Mutex<HashMap<String, f64>>,
    failing_symbols: Mutex<HashMap<String, DataError>>,
    failure: Mutex<Option<DataError>>,
    delay: Mutex<Duration>,
    timestamp: AtomicI64,
    calls: AtomicUsize,
    completed: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prices(prices: &[(&str, f64)], timestamp: i64) -> Self {
        let provider = Self::new();
        for (symbol, price) in prices {
            provider.set_price(symbol, *price);
        }
        provider.set_timestamp(timestamp);
        provider
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_timestamp(&self, timestamp: i64) {
        self.timestamp.store(timestamp, Ordering::SeqCst);
    }

    pub fn fail_symbol(&self, symbol: &str, error: DataError) {
        self.failing_symbols.lock().unwrap().insert(symbol.to_string(), error);
    }

    pub fn fail_all(&self, error: Option<DataError>) {
        *self.failure.lock().unwrap() = error;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteProvider for FakeProvider {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_quotes(&self, symbols: &[String]) -> Result<QuoteBatch, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbols.to_vec());

        // 在等待前读取时间戳，模拟请求发出时刻的抓取时间
        let timestamp = self.timestamp.load(Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.failure.lock().unwrap().clone() {
            self.completed.fetch_add(1, Ordering::SeqCst);
            return Err(error);
        }

        let prices = self.prices.lock().unwrap().clone();
        let failing = self.failing_symbols.lock().unwrap().clone();
        let mut batch = QuoteBatch::default();
        for symbol in symbols {
            if let Some(error) = failing.get(symbol) {
                batch = batch.with_failure(symbol, error.clone());
            } else if let Some(price) = prices.get(symbol) {
                batch.quotes.push(Quote::new(symbol, *price, timestamp));
            }
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(batch)
    }
}

pub fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

use crate::errors::Result;
use crate::market_clock::MarketClock;
use std::path::PathBuf;
use std::time::Duration;

/// 一组刷新节奏：自选列表同步间隔与行情查询间隔
///
/// 两者服务于不同的消费者，因此分开配置。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub watchlist_sync: Duration,
    pub quote_query: Duration,
}

impl Cadence {
    pub const fn new(watchlist_sync: Duration, quote_query: Duration) -> Self {
        Self {
            watchlist_sync,
            quote_query,
        }
    }

    /// 开市时的默认节奏
    pub const fn market_open() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(15))
    }

    /// 休市时的默认节奏
    pub const fn market_closed() -> Self {
        Self::new(Duration::from_secs(15 * 60), Duration::from_secs(5 * 60))
    }
}

pub struct Config {
    pub data_dir: String,
    pub open_cadence: Cadence,
    pub closed_cadence: Cadence,
    pub market_check_period: Duration,
    pub background_period: Duration,
    pub fetch_timeout: Duration,
    pub provider_base_url: String,
    pub batch_size: usize,
    pub min_request_interval: Duration,
    pub market_timezone: String,
    pub session_open: String,
    pub session_close: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            data_dir: "data".to_string(),
            open_cadence: Cadence::market_open(),
            closed_cadence: Cadence::market_closed(),
            market_check_period: Duration::from_secs(60),
            background_period: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            provider_base_url: "https://query1.finance.yahoo.com".to_string(),
            batch_size: 50,
            min_request_interval: Duration::from_millis(500),
            market_timezone: "America/New_York".to_string(),
            session_open: "09:30".to_string(),
            session_close: "16:00".to_string(),
        }
    }

    pub fn with_data_dir(mut self, dir: &str) -> Self {
        self.data_dir = dir.to_string();
        self
    }

    pub fn with_open_cadence(mut self, cadence: Cadence) -> Self {
        self.open_cadence = cadence;
        self
    }

    pub fn with_closed_cadence(mut self, cadence: Cadence) -> Self {
        self.closed_cadence = cadence;
        self
    }

    pub fn with_market_check_period(mut self, period: Duration) -> Self {
        self.market_check_period = period;
        self
    }

    pub fn with_background_period(mut self, period: Duration) -> Self {
        self.background_period = period;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_provider_base_url(mut self, url: &str) -> Self {
        self.provider_base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
        self.min_request_interval = interval;
        self
    }

    pub fn with_market_session(mut self, timezone: &str, open: &str, close: &str) -> Self {
        self.market_timezone = timezone.to_string();
        self.session_open = open.to_string();
        self.session_close = close.to_string();
        self
    }

    /// 行情表文件路径
    pub fn quotes_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("quotes.arrow")
    }

    /// 自选列表成员文件路径
    pub fn watchlist_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("watchlist.json")
    }

    pub fn market_clock(&self) -> Result<MarketClock> {
        MarketClock::from_names(&self.market_timezone, &self.session_open, &self.session_close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new()
            .with_data_dir("/tmp/quotes")
            .with_provider_base_url("http://localhost:8080/")
            .with_batch_size(0)
            .with_fetch_timeout(Duration::from_secs(3));

        assert_eq!(config.provider_base_url, "http://localhost:8080");
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.quotes_path(), PathBuf::from("/tmp/quotes/quotes.arrow"));
        assert_eq!(config.watchlist_path(), PathBuf::from("/tmp/quotes/watchlist.json"));
        assert_eq!(config.background_period, Duration::from_secs(30));
    }

    #[test]
    fn open_cadence_is_shorter_than_closed() {
        let config = Config::new();
        assert!(config.open_cadence.watchlist_sync < config.closed_cadence.watchlist_sync);
        assert!(config.open_cadence.quote_query < config.closed_cadence.quote_query);
        assert!(config.market_clock().is_ok());
    }
}

use chrono::{DateTime, Datelike, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Mutex;

use crate::errors::{QuoteHubError, Result};

/// 时间来源，调度器通过它读取当前时间
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动设置的时钟，用于模拟和测试
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

/// 交易时段判断
///
/// 周一至周五，交易所当地时间严格处于开盘与收盘之间时视为开市。
/// 不包含节假日日历，节假日会被误判为开市。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketClock {
    timezone: Tz,
    session_open: NaiveTime,
    session_close: NaiveTime,
}

impl Default for MarketClock {
    fn default() -> Self {
        Self::new(
            chrono_tz::America::New_York,
            NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
        )
    }
}

impl MarketClock {
    pub fn new(timezone: Tz, session_open: NaiveTime, session_close: NaiveTime) -> Self {
        Self {
            timezone,
            session_open,
            session_close,
        }
    }

    /// 从时区名称和 "HH:MM" 格式的开收盘时间创建
    pub fn from_names(timezone: &str, session_open: &str, session_close: &str) -> Result<Self> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|e| QuoteHubError::TimezoneError(format!("{}: {}", timezone, e)))?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|e| QuoteHubError::ConfigError(format!("Invalid session time {}: {}", s, e)))
        };
        let open = parse(session_open)?;
        let close = parse(session_close)?;
        if open >= close {
            return Err(QuoteHubError::ConfigError(format!(
                "Session open {} must be before close {}", session_open, session_close
            )));
        }
        Ok(Self::new(timezone, open, close))
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// 给定时刻市场是否开市
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&self.timezone);
        let weekday_ok = !matches!(local.weekday(), Weekday::Sat | Weekday::Sun);
        let time = local.time();
        weekday_ok && time > self.session_open && time < self.session_close
    }
}

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use crate::models::watchlist::Watchlist;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// 将Unix毫秒时间格式化为交易所当地时间
pub fn format_epoch_millis(millis: i64, tz: Tz) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        None => "-".to_string(),
    }
}

/// 大数字的简写形式，例如 2.35T、52.1M
pub fn format_compact(value: i64) -> String {
    let abs = value.unsigned_abs() as f64;
    let sign = if value < 0 { "-" } else { "" };
    match abs {
        a if a >= 1e12 => format!("{}{:.2}T", sign, a / 1e12),
        a if a >= 1e9 => format!("{}{:.2}B", sign, a / 1e9),
        a if a >= 1e6 => format!("{}{:.2}M", sign, a / 1e6),
        a if a >= 1e3 => format!("{}{:.2}K", sign, a / 1e3),
        a => format!("{}{}", sign, a),
    }
}

/// 把自选列表渲染成文本表格的各行
pub fn watchlist_table(watchlist: &Watchlist, tz: Tz) -> Vec<String> {
    let mut lines = Vec::with_capacity(watchlist.len() + 2);
    lines.push(format!(
        "{:<8} {:<24} {:>10} {:>9} {:>8} {:>10} {:<25}",
        "Symbol", "Name", "Price", "Change", "Chg%", "Volume", "Updated"
    ));
    lines.push(format!("{:-<100}", ""));
    for entry in &watchlist.entries {
        match &entry.quote {
            Some(q) => lines.push(format!(
                "{:<8} {:<24.24} {:>10.2} {:>+9.2} {:>+7.2}% {:>10} {:<25}",
                q.symbol,
                q.name,
                q.price,
                q.change,
                q.change_percent,
                format_compact(q.volume),
                format_epoch_millis(q.timestamp, tz)
            )),
            None => lines.push(format!("{:<8} {:<24} {:>10}", entry.symbol, "(not yet refreshed)", "-")),
        }
    }
    lines
}

/// 按固定周期触发的显示定时器，首次在一个周期之后触发
///
/// 节奏改变时重新创建，其他事件不会推迟下一次触发。
pub fn display_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quote::Quote;

    #[test]
    fn compact_numbers() {
        assert_eq!(format_compact(2_350_000_000_000), "2.35T");
        assert_eq!(format_compact(52_100_000), "52.10M");
        assert_eq!(format_compact(-1_500), "-1.50K");
        assert_eq!(format_compact(999), "999");
    }

    #[test]
    fn formats_in_exchange_zone() {
        // 2024-06-10 14:00:00 UTC = 10:00 EDT
        let text = format_epoch_millis(1_718_028_000_000, chrono_tz::America::New_York);
        assert_eq!(text, "2024-06-10 10:00:00 EDT");
    }

    #[test]
    fn table_marks_unresolved_rows() {
        let mut watchlist = Watchlist::from_quotes(vec![Quote::new("AAPL", 150.0, 0)]);
        watchlist.entries.push(crate::models::watchlist::WatchlistEntry {
            symbol: "MSFT".to_string(),
            quote: None,
        });
        let lines = watchlist_table(&watchlist, chrono_tz::UTC);
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("AAPL"));
        assert!(lines[3].contains("not yet refreshed"));
    }

    #[tokio::test(start_paused = true)]
    async fn display_ticks_are_not_postponed_by_other_events() {
        let start = Instant::now();
        let mut display = display_interval(Duration::from_secs(10));
        let mut noise = tokio::time::interval(Duration::from_secs(3));
        let mut ticks = Vec::new();

        while ticks.len() < 3 {
            tokio::select! {
                _ = display.tick() => ticks.push(start.elapsed().as_secs()),
                _ = noise.tick() => {}
            }
        }
        assert_eq!(ticks, vec![10, 20, 30]);
    }
}

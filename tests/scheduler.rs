mod common;

use chrono::{DateTime, TimeZone, Utc};
use common::FakeProvider;
use quotehub::market_clock::ManualClock;
use quotehub::services::{RefreshScheduler, WatchlistSynchronizer};
use quotehub::store::{QuoteStore, WatchlistRepository};
use quotehub::{Cadence, MarketClock};
use std::sync::Arc;
use std::time::Duration;

fn new_york(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    chrono_tz::America::New_York
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .single()
        .unwrap()
        .with_timezone(&Utc)
}

const OPEN: Cadence = Cadence::new(Duration::from_secs(60), Duration::from_secs(15));
const CLOSED: Cadence = Cadence::new(Duration::from_secs(50), Duration::from_secs(300));

struct Harness {
    provider: Arc<FakeProvider>,
    store: Arc<QuoteStore>,
    clock: Arc<ManualClock>,
    scheduler: RefreshScheduler,
}

fn harness(start: DateTime<Utc>, symbols: &[&str]) -> Harness {
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 150.0), ("MSFT", 300.0)], 1));
    let store = Arc::new(QuoteStore::in_memory());
    let sync = Arc::new(WatchlistSynchronizer::new(
        provider.clone(),
        store.clone(),
        Duration::from_secs(120),
    ));
    let repository = Arc::new(WatchlistRepository::in_memory(symbols));
    let clock = Arc::new(ManualClock::new(start));
    let scheduler = RefreshScheduler::new(
        sync,
        repository,
        MarketClock::default(),
        clock.clone(),
        OPEN,
        CLOSED,
        Duration::from_secs(60),
    );
    Harness {
        provider,
        store,
        clock,
        scheduler,
    }
}

#[tokio::test(start_paused = true)]
async fn start_seeds_cadence_from_market_state() {
    // 2024-06-10 周一 10:00
    let h = harness(new_york(2024, 6, 10, 10, 0), &["AAPL"]);
    assert!(!h.scheduler.is_running());

    h.scheduler.start();
    assert!(h.scheduler.is_running());
    assert_eq!(h.scheduler.last_observed_open(), Some(true));
    assert_eq!(h.scheduler.current_cadence(), OPEN);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.provider.calls(), 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn switches_cadence_within_one_tick_without_cancelling_fetch() {
    // 2024-06-08 周六
    let h = harness(new_york(2024, 6, 8, 10, 0), &["AAPL", "MSFT"]);
    h.provider.set_delay(Duration::from_secs(30));
    let mut cadence = h.scheduler.subscribe_cadence();

    h.scheduler.start();
    assert_eq!(h.scheduler.current_cadence(), CLOSED);

    // t=50s 休市节奏触发同步，抓取持续到 t=80s
    tokio::time::sleep(Duration::from_secs(55)).await;
    assert_eq!(h.provider.calls(), 1);
    assert_eq!(h.provider.completed(), 0);

    // 市场在两次检查之间开市
    h.clock.set(new_york(2024, 6, 10, 10, 0));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(h.scheduler.last_observed_open(), Some(true));
    assert_eq!(h.scheduler.current_cadence(), OPEN);
    assert!(cadence.has_changed().unwrap());
    assert_eq!(cadence.borrow_and_update().quote_query, OPEN.quote_query);

    // 切换时正在进行的抓取没有被取消
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.provider.completed(), 1);
    assert_eq!(h.store.get("AAPL").await.map(|q| q.price), Some(150.0));
    assert_eq!(h.store.get("MSFT").await.map(|q| q.price), Some(300.0));

    // 新节奏从切换时刻 t=60s 起算，下一次同步在 t=120s
    assert_eq!(h.provider.calls(), 1);
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(h.provider.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent_and_halts_syncs() {
    let h = harness(new_york(2024, 6, 10, 10, 0), &["AAPL"]);
    h.scheduler.stop();

    h.scheduler.start();
    h.scheduler.stop();
    h.scheduler.stop();
    assert!(!h.scheduler.is_running());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.provider.calls(), 0);

    // 重新启动后恢复
    h.scheduler.start();
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_watchlist_issues_no_requests() {
    let h = harness(new_york(2024, 6, 10, 10, 0), &[]);
    h.scheduler.start();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.provider.calls(), 0);
}

mod common;

use common::FakeProvider;
use quotehub::services::{BackgroundRunner, WatchlistSynchronizer};
use quotehub::store::{QuoteStore, WatchlistRepository};
use quotehub::{DataError, NetworkError};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn runner(
    provider: Arc<FakeProvider>,
    symbols: &[&str],
    shutdown: CancellationToken,
) -> (BackgroundRunner, Arc<QuoteStore>) {
    let store = Arc::new(QuoteStore::in_memory());
    let sync = Arc::new(WatchlistSynchronizer::new(provider, store.clone(), Duration::from_secs(10)));
    let repository = Arc::new(WatchlistRepository::in_memory(symbols));
    (
        BackgroundRunner::new(sync, repository, Duration::from_secs(30), shutdown),
        store,
    )
}

#[tokio::test(start_paused = true)]
async fn runs_on_fixed_period_until_shutdown() {
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 150.0)], 1));
    let shutdown = CancellationToken::new();
    let (runner, store) = runner(provider.clone(), &["AAPL"], shutdown.clone());
    let handle = runner.spawn();

    // 第一次立即执行，之后每30秒一次：t=0, 30, 60, 90
    tokio::time::sleep(Duration::from_secs(95)).await;
    assert_eq!(provider.calls(), 4);
    assert_eq!(store.get("AAPL").await.map(|q| q.price), Some(150.0));

    shutdown.cancel();
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(provider.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_cycles_are_not_fatal() {
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 150.0)], 1));
    provider.fail_all(Some(DataError::Network(NetworkError::NoInternet)));
    let shutdown = CancellationToken::new();
    let (runner, store) = runner(provider.clone(), &["AAPL"], shutdown.clone());
    let handle = runner.spawn();

    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(provider.calls(), 3);
    assert!(store.snapshot().await.is_empty());
    assert!(!handle.is_finished());

    // 网络恢复后下一个周期写入
    provider.fail_all(None);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(provider.calls(), 4);
    assert!(store.get("AAPL").await.is_some());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_hanging_cycle() {
    let provider = Arc::new(FakeProvider::with_prices(&[("AAPL", 150.0)], 1));
    provider.set_delay(Duration::from_secs(3600));
    let shutdown = CancellationToken::new();
    let (runner, store) = runner(provider.clone(), &["AAPL"], shutdown.clone());
    let handle = runner.spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.calls(), 1);
    shutdown.cancel();
    handle.await.unwrap();
    assert!(store.snapshot().await.is_empty());
}

//! 自选列表同步器：抓取、合并、报告。
//!
//! 全局同一时刻最多只有一个抓取周期在进行。周期运行期间到达的调用会加入
//! 正在进行的周期并得到同一个结果，不会再发起远程请求。周期由所有等待者
//! 共同驱动，全部等待者放弃时远程调用随之中止，状态回到 `Idle`，不做任何合并。

use crate::errors::{DataError, NetworkError};
use crate::models::quote::normalize_symbols;
use crate::models::resource::Resource;
use crate::models::watchlist::Watchlist;
use crate::provider::{QuoteBatch, QuoteProvider};
use crate::store::QuoteStore;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub type SyncResult = Resource<Watchlist, DataError>;

type Cycle = BoxFuture<'static, SyncResult>;

/// 同步器的运行状态
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Idle,
    InFlight,
    Errored(DataError),
}

struct Inner {
    provider: Arc<dyn QuoteProvider + Send + Sync>,
    store: Arc<QuoteStore>,
    fetch_timeout: Duration,
    // 正在进行的周期；只保存弱引用，等待者全部放弃时周期随之释放
    gate: Mutex<Option<(u64, WeakShared<Cycle>)>>,
    next_cycle: AtomicU64,
    state: watch::Sender<SyncState>,
    // 每个完成的周期推送一次结果，不做合并
    outcomes: Mutex<Vec<mpsc::UnboundedSender<SyncResult>>>,
}

impl Inner {
    /// 清空闸门并设置状态，只处理属于自己的周期
    fn release(&self, id: u64, state: SyncState) {
        if let Ok(mut gate) = self.gate.lock() {
            if matches!(gate.as_ref(), Some((current, _)) if *current == id) {
                *gate = None;
                self.state.send_replace(state);
            }
        }
    }

    fn publish_outcome(&self, result: &SyncResult) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.retain(|tx| tx.send(result.clone()).is_ok());
        }
    }

    async fn commit(&self, symbols: &[String], batch: QuoteBatch) -> SyncResult {
        let QuoteBatch { quotes, failures } = batch;
        let resolved: Vec<String> = quotes.iter().map(|q| q.symbol.clone()).collect();

        match self.store.merge(quotes.clone()).await {
            Ok(outcome) => {
                if !outcome.stale.is_empty() {
                    debug!("Dropped {} out-of-order quotes: {:?}", outcome.stale.len(), outcome.stale);
                }
                let snapshot = self.store.snapshot().await;
                match failures.first() {
                    None => Resource::success(Watchlist::from_snapshot(symbols, &snapshot)),
                    // 没有任何代码成功，按整体失败处理
                    Some(failure) if resolved.is_empty() => {
                        warn!("Sync failed for all {} symbols: {}", failures.len(), failure.error);
                        Resource::error(failure.error.clone(), None)
                    }
                    Some(failure) => {
                        warn!(
                            "Partial sync: {} resolved, {} failed (first: {} {})",
                            resolved.len(),
                            failures.len(),
                            failure.symbol,
                            failure.error
                        );
                        let data = Watchlist::from_snapshot(&resolved, &snapshot);
                        Resource::error(failure.error.clone(), Some(data))
                    }
                }
            }
            Err(e) => {
                let error = DataError::from(e);
                warn!("Failed to commit {} quotes: {}", resolved.len(), error);
                Resource::error(error, Some(Watchlist::from_quotes(quotes)))
            }
        }
    }
}

/// 周期被丢弃时释放闸门
struct CycleGuard {
    inner: Arc<Inner>,
    id: u64,
    finished: bool,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if !self.finished {
            debug!("Sync cycle {} aborted", self.id);
            self.inner.release(self.id, SyncState::Idle);
        }
    }
}

async fn run_cycle(inner: Arc<Inner>, id: u64, symbols: Vec<String>) -> SyncResult {
    let mut guard = CycleGuard {
        inner: inner.clone(),
        id,
        finished: false,
    };

    info!(
        "Sync cycle {} fetching {} symbols from {}",
        id,
        symbols.len(),
        inner.provider.provider_name()
    );
    let fetched = tokio::time::timeout(inner.fetch_timeout, inner.provider.fetch_quotes(&symbols)).await;

    let result = match fetched {
        Err(_) => {
            warn!("Sync cycle {} timed out after {:?}", id, inner.fetch_timeout);
            Resource::error(DataError::Network(NetworkError::Timeout), None)
        }
        Ok(Err(error)) => {
            warn!("Sync cycle {} failed: {}", id, error);
            Resource::error(error, None)
        }
        Ok(Ok(batch)) => inner.commit(&symbols, batch).await,
    };

    let state = match &result {
        Resource::Error { error, .. } => SyncState::Errored(error.clone()),
        _ => SyncState::Idle,
    };
    guard.finished = true;
    inner.publish_outcome(&result);
    inner.release(id, state);
    result
}

pub struct WatchlistSynchronizer {
    inner: Arc<Inner>,
}

impl WatchlistSynchronizer {
    pub fn new(
        provider: Arc<dyn QuoteProvider + Send + Sync>,
        store: Arc<QuoteStore>,
        fetch_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                fetch_timeout,
                gate: Mutex::new(None),
                next_cycle: AtomicU64::new(1),
                state,
                outcomes: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<QuoteStore> {
        &self.inner.store
    }

    pub fn state(&self) -> SyncState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state.subscribe()
    }

    /// 订阅已完成周期的结果，被中止的周期不产生结果
    pub fn subscribe_outcomes(&self) -> mpsc::UnboundedReceiver<SyncResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut outcomes) = self.inner.outcomes.lock() {
            outcomes.push(tx);
        }
        rx
    }

    pub fn is_in_flight(&self) -> bool {
        self.state() == SyncState::InFlight
    }

    /// 同步给定代码，永不返回 `Err`，所有结果都以 `Resource` 表示
    pub async fn sync<S: AsRef<str>>(&self, symbols: &[S]) -> SyncResult {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Resource::success(Watchlist::new());
        }
        self.join_or_start(symbols).await
    }

    fn join_or_start(&self, symbols: Vec<String>) -> Shared<Cycle> {
        let mut gate = match self.inner.gate.lock() {
            Ok(gate) => gate,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some((id, cycle)) = gate.as_ref().and_then(|(id, weak)| weak.upgrade().map(|c| (*id, c))) {
            debug!("Coalescing sync of {:?} into in-flight cycle {}", symbols, id);
            return cycle;
        }

        let id = self.inner.next_cycle.fetch_add(1, Ordering::Relaxed);
        let cycle = run_cycle(self.inner.clone(), id, symbols).boxed().shared();
        if let Some(weak) = cycle.downgrade() {
            *gate = Some((id, weak));
            self.inner.state.send_replace(SyncState::InFlight);
        }
        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UnreachableProvider;

    #[async_trait]
    impl QuoteProvider for UnreachableProvider {
        fn provider_name(&self) -> &'static str {
            "unreachable"
        }

        async fn fetch_quotes(&self, _symbols: &[String]) -> Result<QuoteBatch, DataError> {
            Err(DataError::Network(NetworkError::NoInternet))
        }
    }

    fn synchronizer() -> WatchlistSynchronizer {
        WatchlistSynchronizer::new(
            Arc::new(UnreachableProvider),
            Arc::new(QuoteStore::in_memory()),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn empty_symbol_set_skips_provider() {
        let sync = synchronizer();
        let empty: [&str; 0] = [];
        let result = sync.sync(&empty).await;
        assert_eq!(result, Resource::success(Watchlist::new()));
        assert_eq!(sync.state(), SyncState::Idle);
    }

    #[tokio::test]
    async fn total_failure_is_reported_not_thrown() {
        let sync = synchronizer();
        let result = sync.sync(&["AAPL"]).await;
        assert_eq!(result, Resource::error(DataError::Network(NetworkError::NoInternet), None));
        assert_eq!(sync.state(), SyncState::Errored(DataError::Network(NetworkError::NoInternet)));
        assert!(sync.store().snapshot().await.is_empty());
    }
}

//! 行情存储：按代码保存最近一次完整行情，支持快照读取和实时订阅。
//!
//! 写入遵循单调时间戳规则：同一代码的新记录不会被更旧的记录覆盖，
//! 乱序到达的旧结果会被丢弃。每次提交后按提交顺序向所有订阅者推送快照。

pub mod arrow_backend;
pub mod backend;
pub mod watchlist_repo;

use crate::errors::Result;
use crate::models::quote::Quote;
use backend::StoreBackend;
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

pub use arrow_backend::ArrowBackend;
pub use backend::MemoryBackend;
pub use watchlist_repo::WatchlistRepository;

/// 存储在某次提交后的完整内容
pub type Snapshot = Arc<BTreeMap<String, Quote>>;

/// 快照订阅，按提交顺序接收每一个快照
pub type SnapshotStream = mpsc::UnboundedReceiver<Snapshot>;

/// 一次合并的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// 已写入的代码
    pub applied: Vec<String>,
    /// 因时间戳更旧而被丢弃的代码
    pub stale: Vec<String>,
}

struct StoreState {
    quotes: BTreeMap<String, Quote>,
    subscribers: Vec<mpsc::UnboundedSender<Snapshot>>,
}

impl StoreState {
    fn publish(&mut self) {
        let snapshot: Snapshot = Arc::new(self.quotes.clone());
        self.subscribers.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

pub struct QuoteStore {
    backend: Arc<dyn StoreBackend>,
    // 持锁完成后端写入与推送，保证提交顺序与推送顺序一致
    state: Mutex<StoreState>,
}

impl QuoteStore {
    /// 从后端加载已有数据并创建存储
    pub async fn open(backend: Arc<dyn StoreBackend>) -> Result<Self> {
        let quotes: BTreeMap<String, Quote> = backend
            .load_all()
            .await?
            .into_iter()
            .map(|q| (q.symbol.clone(), q))
            .collect();
        info!("Quote store opened with {} quotes", quotes.len());

        Ok(Self {
            backend,
            state: Mutex::new(StoreState {
                quotes,
                subscribers: Vec::new(),
            }),
        })
    }

    /// 创建基于内存后端的空存储
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            state: Mutex::new(StoreState {
                quotes: BTreeMap::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    /// 按单调时间戳规则合并行情
    ///
    /// 后端写入失败时内存状态不变，也不会推送快照。
    pub async fn merge(&self, quotes: Vec<Quote>) -> Result<MergeOutcome> {
        let mut state = self.state.lock().await;

        let mut fresh: BTreeMap<String, Quote> = BTreeMap::new();
        let mut outcome = MergeOutcome::default();
        for quote in quotes {
            let stale = match fresh.get(&quote.symbol).or_else(|| state.quotes.get(&quote.symbol)) {
                Some(existing) if !quote.supersedes(existing) => {
                    debug!(
                        "Dropping stale quote for {} ({} < {})",
                        quote.symbol, quote.timestamp, existing.timestamp
                    );
                    true
                }
                _ => false,
            };

            if stale {
                outcome.stale.push(quote.symbol);
            } else {
                fresh.insert(quote.symbol.clone(), quote);
            }
        }

        if fresh.is_empty() {
            return Ok(outcome);
        }

        let rows: Vec<Quote> = fresh.values().cloned().collect();
        self.backend.upsert(&rows).await?;

        for (symbol, quote) in fresh {
            outcome.applied.push(symbol.clone());
            state.quotes.insert(symbol, quote);
        }
        state.publish();
        Ok(outcome)
    }

    /// 删除单个代码，不存在时不推送
    pub async fn delete(&self, symbol: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.quotes.contains_key(symbol) {
            return Ok(false);
        }
        self.backend.delete(symbol).await?;
        state.quotes.remove(symbol);
        state.publish();
        Ok(true)
    }

    pub async fn delete_all(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.backend.delete_all().await?;
        state.quotes.clear();
        state.publish();
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        Arc::new(self.state.lock().await.quotes.clone())
    }

    pub async fn get(&self, symbol: &str) -> Option<Quote> {
        self.state.lock().await.quotes.get(symbol).cloned()
    }

    /// 订阅快照，首个元素为当前快照
    pub async fn subscribe(&self) -> SnapshotStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;
        let _ = tx.send(Arc::new(state.quotes.clone()));
        state.subscribers.push(tx);
        rx
    }
}

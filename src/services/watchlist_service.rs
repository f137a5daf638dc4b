use crate::errors::{DataError, Result};
use crate::models::quote::normalize_symbol;
use crate::models::resource::Resource;
use crate::models::watchlist::Watchlist;
use crate::services::synchronizer::{SyncResult, SyncState, WatchlistSynchronizer};
use crate::store::{QuoteStore, Snapshot, WatchlistRepository};
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 订阅者收到的自选列表状态
pub type WatchlistStream = mpsc::UnboundedReceiver<Resource<Watchlist, DataError>>;

#[derive(Default)]
struct Subscribers {
    latest: Option<Resource<Watchlist, DataError>>,
    last_data: Option<Watchlist>,
    senders: Vec<mpsc::UnboundedSender<Resource<Watchlist, DataError>>>,
}

impl Subscribers {
    fn publish(&mut self, value: Resource<Watchlist, DataError>) {
        self.senders.retain(|tx| tx.send(value.clone()).is_ok());
        if let Some(data) = value.data() {
            self.last_data = Some(data.clone());
        }
        self.latest = Some(value);
    }
}

/// 面向展示层的自选列表服务
///
/// 提供增删代码、立即刷新，以及 `Resource<Watchlist, DataError>` 的实时序列。
/// 存储的每次提交、每个完成的同步周期以及开始抓取都会转成一条推送。
pub struct WatchlistService {
    synchronizer: Arc<WatchlistSynchronizer>,
    store: Arc<QuoteStore>,
    repository: Arc<WatchlistRepository>,
    subscribers: Arc<Mutex<Subscribers>>,
    forwarder: JoinHandle<()>,
}

impl WatchlistService {
    /// 创建服务并启动转发任务，需要在 tokio 运行时中调用
    pub async fn start(
        synchronizer: Arc<WatchlistSynchronizer>,
        repository: Arc<WatchlistRepository>,
    ) -> Self {
        let store = synchronizer.store().clone();
        let subscribers = Arc::new(Mutex::new(Subscribers::default()));

        let mut snapshots = store.subscribe().await;
        let mut outcomes = synchronizer.subscribe_outcomes();
        let mut states = synchronizer.subscribe_state();
        let forwarder = {
            let repository = repository.clone();
            let subscribers = subscribers.clone();
            tokio::spawn(async move {
                let mut current: Snapshot = Arc::new(Default::default());
                loop {
                    let view = |current: &Snapshot| Watchlist::from_snapshot(&repository.symbols(), current);
                    // 顺序：快照先于周期结果，周期结果先于状态变化
                    let value = tokio::select! {
                        biased;
                        snapshot = snapshots.recv() => match snapshot {
                            Some(snapshot) => {
                                current = snapshot;
                                Resource::success(view(&current))
                            }
                            None => break,
                        },
                        outcome = outcomes.recv() => match outcome {
                            Some(Resource::Error { error, .. }) => {
                                // 错误时附带最近一次的有效数据
                                let data = subscribers.lock().ok().and_then(|s| s.last_data.clone());
                                Resource::error(error, data)
                            }
                            Some(_) => Resource::success(view(&current)),
                            None => break,
                        },
                        changed = states.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            let state = states.borrow_and_update().clone();
                            match state {
                                SyncState::InFlight => Resource::Loading(true),
                                // 被中止的周期没有结果，收起加载状态
                                SyncState::Idle if is_loading(&subscribers) => Resource::success(view(&current)),
                                _ => continue,
                            }
                        }
                    };
                    if let Ok(mut subs) = subscribers.lock() {
                        subs.publish(value);
                    }
                }
                debug!("Watchlist forwarder stopped");
            })
        };

        Self {
            synchronizer,
            store,
            repository,
            subscribers,
            forwarder,
        }
    }

    pub fn symbols(&self) -> Vec<String> {
        self.repository.symbols()
    }

    /// 当前成员与存储快照连接得到的列表
    pub async fn watchlist(&self) -> Watchlist {
        let snapshot = self.store.snapshot().await;
        Watchlist::from_snapshot(&self.repository.symbols(), &snapshot)
    }

    /// 订阅状态序列，首个元素为最近一次推送（若有）
    pub fn subscribe(&self) -> WatchlistStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            if let Some(latest) = &subs.latest {
                let _ = tx.send(latest.clone());
            }
            subs.senders.push(tx);
        }
        rx
    }

    /// 添加代码并只同步这一个代码
    pub async fn add_symbol(&self, symbol: &str) -> Result<SyncResult> {
        let symbol = normalize_symbol(symbol);
        if self.repository.add(&symbol)? {
            info!("Added {} to watchlist", symbol);
        }
        let mut result = self.synchronizer.sync(&[symbol.as_str()]).await;
        // 加入了别的周期时结果里没有新代码，等它结束后单独再抓一次
        if result.data().map_or(false, |w| !w.contains(&symbol)) {
            info!("{} joined an in-flight sync, fetching it separately", symbol);
            result = self.synchronizer.sync(&[symbol.as_str()]).await;
        }
        self.publish_membership().await;
        Ok(result)
    }

    /// 移除代码并删除其行情
    pub async fn remove_symbol(&self, symbol: &str) -> Result<bool> {
        let symbol = normalize_symbol(symbol);
        if !self.repository.remove(&symbol)? {
            return Ok(false);
        }
        info!("Removed {} from watchlist", symbol);
        if !self.store.delete(&symbol).await? {
            self.publish_membership().await;
        }
        Ok(true)
    }

    /// 立即同步整个列表，与定时任务共用同一个闸门
    pub async fn refresh_now(&self) -> SyncResult {
        let symbols = self.repository.symbols();
        info!("Manual refresh of {} symbols", symbols.len());
        let result = self.synchronizer.sync(&symbols).await;
        match result {
            Resource::Success(_) => Resource::success(self.watchlist().await),
            Resource::Error { error, .. } => Resource::error(error, Some(self.watchlist().await)),
            loading => loading,
        }
    }

    async fn publish_membership(&self) {
        let watchlist = self.watchlist().await;
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.publish(Resource::success(watchlist));
        }
    }
}

fn is_loading(subscribers: &Mutex<Subscribers>) -> bool {
    subscribers
        .lock()
        .map(|s| matches!(s.latest, Some(Resource::Loading(_))))
        .unwrap_or(false)
}

impl Drop for WatchlistService {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

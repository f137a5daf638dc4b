use crate::models::resource::Resource;
use crate::services::synchronizer::{SyncResult, WatchlistSynchronizer};
use crate::store::WatchlistRepository;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// 后台兜底同步循环
///
/// 与交互调度器无关，按固定周期调用同步器，保证没有前台消费者时存储也不会过期。
/// 单次失败只记录日志，循环只在收到关闭信号时退出。
pub struct BackgroundRunner {
    synchronizer: Arc<WatchlistSynchronizer>,
    repository: Arc<WatchlistRepository>,
    period: Duration,
    shutdown: CancellationToken,
}

impl BackgroundRunner {
    pub fn new(
        synchronizer: Arc<WatchlistSynchronizer>,
        repository: Arc<WatchlistRepository>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            synchronizer,
            repository,
            period,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!("Background runner started, period {:?}", self.period);
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Background runner: shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    let symbols = self.repository.symbols();
                    if symbols.is_empty() {
                        continue;
                    }
                    // 关闭信号同样可以打断正在等待的周期
                    tokio::select! {
                        _ = self.shutdown.cancelled() => {
                            info!("Background runner: shutdown during sync");
                            break;
                        }
                        result = self.synchronizer.sync(&symbols) => log_cycle(&result),
                    }
                }
            }
        }

        info!("Background runner stopped cleanly");
    }
}

fn log_cycle(result: &SyncResult) {
    match result {
        Resource::Success(watchlist) => {
            info!("Background sync refreshed {} symbols", watchlist.resolved_count())
        }
        Resource::Error { error, data } => match error.network() {
            Some(kind) => warn!(
                "Background sync failed [{:?}]: {} ({} symbols still usable)",
                kind,
                error,
                data.as_ref().map(|d| d.resolved_count()).unwrap_or(0)
            ),
            None => error!("Background sync failed: {}", error),
        },
        Resource::Loading(_) => {}
    }
}

//! 刷新调度器：按市场开闭状态切换同步节奏。
//!
//! 每个检查周期（默认60秒）重新判断一次市场状态；状态翻转时更新两种节奏，
//! 取消旧的同步定时器并按新节奏重新布置。定时器触发的每次同步都在独立任务中
//! 运行，取消定时器不会中断已经开始的抓取。

use crate::config::{Cadence, Config};
use crate::market_clock::{Clock, MarketClock};
use crate::models::resource::Resource;
use crate::services::synchronizer::WatchlistSynchronizer;
use crate::store::WatchlistRepository;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct TimerState {
    last_observed_open: Option<bool>,
    // 根令牌取消时所有子定时器一并停止
    root: Option<CancellationToken>,
    sync_timer: Option<CancellationToken>,
}

struct Inner {
    synchronizer: Arc<WatchlistSynchronizer>,
    repository: Arc<WatchlistRepository>,
    market: MarketClock,
    clock: Arc<dyn Clock>,
    open_cadence: Cadence,
    closed_cadence: Cadence,
    check_period: Duration,
    cadence: watch::Sender<Cadence>,
    timers: Mutex<TimerState>,
}

impl Inner {
    fn cadence_for(&self, open: bool) -> Cadence {
        if open {
            self.open_cadence
        } else {
            self.closed_cadence
        }
    }

    /// 发布新节奏，取消旧同步定时器并重新布置
    fn arm_sync_timer(self: &Arc<Self>, timers: &mut TimerState, open: bool) {
        let cadence = self.cadence_for(open);
        self.cadence.send_replace(cadence);

        if let Some(old) = timers.sync_timer.take() {
            old.cancel();
        }
        let token = match &timers.root {
            Some(root) => root.child_token(),
            None => return,
        };
        timers.sync_timer = Some(token.clone());

        let inner = self.clone();
        tokio::spawn(async move {
            let period = cadence.watchlist_sync;
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => inner.fire_sync(),
                }
            }
            debug!("Sync timer ({:?}) disarmed", period);
        });
    }

    fn fire_sync(&self) {
        let symbols = self.repository.symbols();
        if symbols.is_empty() {
            debug!("Scheduled sync skipped: watchlist is empty");
            return;
        }
        let synchronizer = self.synchronizer.clone();
        // 独立任务，定时器被取消时抓取继续
        tokio::spawn(async move {
            match synchronizer.sync(&symbols).await {
                Resource::Error { error, .. } => warn!("Scheduled sync failed: {}", error),
                _ => debug!("Scheduled sync of {} symbols done", symbols.len()),
            }
        });
    }

    fn check_market(self: &Arc<Self>) {
        let open = self.market.is_open(self.clock.now());
        let mut timers = match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if timers.root.is_none() || timers.last_observed_open == Some(open) {
            return;
        }
        info!("Market is now {}, switching cadence", if open { "open" } else { "closed" });
        timers.last_observed_open = Some(open);
        self.arm_sync_timer(&mut timers, open);
    }
}

/// 按市场开闭状态调整刷新节奏的调度器
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        synchronizer: Arc<WatchlistSynchronizer>,
        repository: Arc<WatchlistRepository>,
        market: MarketClock,
        clock: Arc<dyn Clock>,
        open_cadence: Cadence,
        closed_cadence: Cadence,
        check_period: Duration,
    ) -> Self {
        let (cadence, _) = watch::channel(closed_cadence);
        Self {
            inner: Arc::new(Inner {
                synchronizer,
                repository,
                market,
                clock,
                open_cadence,
                closed_cadence,
                check_period,
                cadence,
                timers: Mutex::new(TimerState::default()),
            }),
        }
    }

    pub fn from_config(
        config: &Config,
        synchronizer: Arc<WatchlistSynchronizer>,
        repository: Arc<WatchlistRepository>,
        market: MarketClock,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            synchronizer,
            repository,
            market,
            clock,
            config.open_cadence,
            config.closed_cadence,
            config.market_check_period,
        )
    }

    /// 启动：取消已有定时器，读取一次市场状态，布置检查定时器和同步定时器
    pub fn start(&self) {
        let inner = &self.inner;
        let mut timers = match inner.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(root) = timers.root.take() {
            root.cancel();
        }
        timers.sync_timer = None;

        let open = inner.market.is_open(inner.clock.now());
        let root = CancellationToken::new();
        timers.root = Some(root.clone());
        timers.last_observed_open = Some(open);
        info!(
            "Refresh scheduler started, market {}",
            if open { "open" } else { "closed" }
        );
        inner.arm_sync_timer(&mut timers, open);

        let check = inner.clone();
        let period = inner.check_period;
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = root.cancelled() => break,
                    _ = ticker.tick() => check.check_market(),
                }
            }
            debug!("Market check timer stopped");
        });
    }

    /// 停止所有定时器，可重复调用
    pub fn stop(&self) {
        let mut timers = match self.inner.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(root) = timers.root.take() {
            root.cancel();
            info!("Refresh scheduler stopped");
        }
        timers.sync_timer = None;
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .timers
            .lock()
            .map(|t| t.root.is_some())
            .unwrap_or(false)
    }

    /// 最近一次观察到的市场状态，未启动时为None
    pub fn last_observed_open(&self) -> Option<bool> {
        self.inner.timers.lock().ok().and_then(|t| t.last_observed_open)
    }

    pub fn current_cadence(&self) -> Cadence {
        *self.inner.cadence.borrow()
    }

    /// 订阅节奏变化，行情查询等消费者据此调整自己的间隔
    pub fn subscribe_cadence(&self) -> watch::Receiver<Cadence> {
        self.inner.cadence.subscribe()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

// 公开导出的模块，供外部使用
pub mod errors;
pub mod market_clock;
pub mod models;
pub mod provider;
pub mod services;
pub mod store;

pub mod config;
pub mod util;

// 重新导出常用类型，方便使用
pub use config::{Cadence, Config};
pub use errors::{DataError, NetworkError, QuoteHubError, Result};
pub use market_clock::{Clock, MarketClock, SystemClock};
pub use models::quote::Quote;
pub use models::resource::Resource;
pub use models::watchlist::{Watchlist, WatchlistEntry};
pub use provider::{QuoteBatch, QuoteProvider};
pub use services::{BackgroundRunner, RefreshScheduler, SyncState, WatchlistService, WatchlistSynchronizer};
pub use store::QuoteStore;

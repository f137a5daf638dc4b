pub mod background;
pub mod scheduler;
pub mod synchronizer;
pub mod watchlist_service;

pub use background::BackgroundRunner;
pub use scheduler::RefreshScheduler;
pub use synchronizer::{SyncResult, SyncState, WatchlistSynchronizer};
pub use watchlist_service::{WatchlistService, WatchlistStream};

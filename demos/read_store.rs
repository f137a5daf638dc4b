use quotehub::config::Config;
use quotehub::store::{ArrowBackend, QuoteStore, WatchlistRepository};
use quotehub::models::watchlist::Watchlist;
use quotehub::util;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::new();
    let market = config.market_clock()?;

    // 打开本地行情表和自选列表
    let store = QuoteStore::open(Arc::new(ArrowBackend::new(config.quotes_path()))).await?;
    let repository = WatchlistRepository::open(config.watchlist_path())?;

    let snapshot = store.snapshot().await;
    println!("行情表记录数: {}", snapshot.len());
    println!("自选代码: {:?}", repository.symbols());
    println!("市场当前{}", if market.is_open(chrono::Utc::now()) { "开市" } else { "休市" });
    println!();

    let watchlist = Watchlist::from_snapshot(&repository.symbols(), &snapshot);
    for line in util::watchlist_table(&watchlist, market.timezone()) {
        println!("{}", line);
    }

    if let Some(quote) = snapshot.values().max_by_key(|q| q.timestamp) {
        println!("\n最近更新: {} @ {}", quote.symbol, util::format_epoch_millis(quote.timestamp, market.timezone()));
    }

    Ok(())
}

use quotehub::config::Config;
use quotehub::market_clock::{MarketClock, SystemClock};
use quotehub::models::resource::Resource;
use quotehub::provider::HttpQuoteProvider;
use quotehub::services::{BackgroundRunner, RefreshScheduler, WatchlistService, WatchlistSynchronizer};
use quotehub::store::{ArrowBackend, QuoteStore, WatchlistRepository};
use quotehub::util;

use anyhow::Context;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Components {
    config: Config,
    market: MarketClock,
    repository: Arc<WatchlistRepository>,
    synchronizer: Arc<WatchlistSynchronizer>,
}

async fn build(config: Config) -> anyhow::Result<Components> {
    let market = config.market_clock()?;
    let repository = Arc::new(WatchlistRepository::open(config.watchlist_path())?);
    let backend = Arc::new(ArrowBackend::new(config.quotes_path()));
    let store = Arc::new(QuoteStore::open(backend).await?);
    let provider = Arc::new(HttpQuoteProvider::new(&config)?);
    let synchronizer = Arc::new(WatchlistSynchronizer::new(provider, store, config.fetch_timeout));

    Ok(Components {
        config,
        market,
        repository,
        synchronizer,
    })
}

fn config_from_matches(matches: &ArgMatches) -> anyhow::Result<Config> {
    let mut config = Config::new();
    if let Some(dir) = matches.value_of("data-dir") {
        config = config.with_data_dir(dir);
    }
    if let Some(url) = matches.value_of("provider-url") {
        config = config.with_provider_base_url(url);
    }
    if let Some(timeout) = matches.value_of("timeout") {
        let secs = timeout.parse::<u64>().context("--timeout must be a number of seconds")?;
        config = config.with_fetch_timeout(Duration::from_secs(secs));
    }
    if let Some(size) = matches.value_of("batch-size") {
        config = config.with_batch_size(size.parse::<usize>().context("--batch-size must be a number")?);
    }
    Ok(config)
}

fn print_result(result: &Resource<quotehub::Watchlist, quotehub::DataError>, market: &MarketClock) {
    match result {
        Resource::Success(watchlist) => {
            for line in util::watchlist_table(watchlist, market.timezone()) {
                info!("{}", line);
            }
        }
        Resource::Error { error, data } => {
            warn!("Refresh failed: {}", error);
            if let Some(watchlist) = data {
                for line in util::watchlist_table(watchlist, market.timezone()) {
                    info!("{}", line);
                }
            }
        }
        Resource::Loading(_) => info!("Refreshing..."),
    }
}

/// 常驻运行：调度器、后台兜底循环和按行情查询节奏输出的显示循环
async fn run(components: Components) -> anyhow::Result<()> {
    let Components {
        config,
        market,
        repository,
        synchronizer,
    } = components;

    let service = WatchlistService::start(synchronizer.clone(), repository.clone()).await;
    let scheduler = RefreshScheduler::from_config(
        &config,
        synchronizer.clone(),
        repository.clone(),
        market,
        Arc::new(SystemClock),
    );
    let shutdown = CancellationToken::new();
    let runner = BackgroundRunner::new(
        synchronizer.clone(),
        repository.clone(),
        config.background_period,
        shutdown.clone(),
    )
    .spawn();

    scheduler.start();
    print_result(&service.refresh_now().await, &market);

    let mut cadence = scheduler.subscribe_cadence();
    let mut updates = service.subscribe();
    let mut display = util::display_interval(cadence.borrow_and_update().quote_query);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received, shutting down");
                break;
            }
            _ = cadence.changed() => {
                let period = cadence.borrow_and_update().quote_query;
                info!("Quote query interval is now {:?}", period);
                display = util::display_interval(period);
            }
            _ = display.tick() => {
                print_result(&Resource::success(service.watchlist().await), &market);
            }
            Some(update) = updates.recv() => {
                if let Resource::Error { error, .. } = &update {
                    warn!("Watchlist update error: {}", error);
                }
            }
        }
    }

    scheduler.stop();
    shutdown.cancel();
    if let Err(e) = runner.await {
        error!("Background runner ended abnormally: {}", e);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let app = App::new("quotehub")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Keeps a watchlist of quotes fresh with a market-hours aware cadence")
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory holding quotes.arrow and watchlist.json")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("provider-url")
                .long("provider-url")
                .value_name("URL")
                .help("Base URL of the quote provider")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .value_name("SECS")
                .help("Provider call timeout in seconds")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("batch-size")
                .long("batch-size")
                .value_name("N")
                .help("Maximum symbols per provider request")
                .takes_value(true)
                .global(true),
        )
        .subcommand(SubCommand::with_name("run").about("Run the scheduler and background runner until Ctrl-C"))
        .subcommand(
            SubCommand::with_name("add")
                .about("Add symbols to the watchlist and fetch them")
                .arg(Arg::with_name("symbol").required(true).multiple_values(true)),
        )
        .subcommand(
            SubCommand::with_name("remove")
                .about("Remove symbols from the watchlist")
                .arg(Arg::with_name("symbol").required(true).multiple_values(true)),
        )
        .subcommand(SubCommand::with_name("list").about("Show the stored watchlist without fetching"))
        .subcommand(SubCommand::with_name("refresh").about("Fetch the whole watchlist once"));

    let matches = app.get_matches();
    // 全局参数会传递到子命令中
    let scoped = matches.subcommand().map(|(_, sub)| sub).unwrap_or(&matches);
    let config = config_from_matches(scoped)?;
    let components = build(config).await?;
    let market = components.market;

    match matches.subcommand() {
        Some(("run", _)) => run(components).await?,
        Some(("add", sub)) => {
            let service = WatchlistService::start(components.synchronizer, components.repository).await;
            for symbol in sub.values_of("symbol").into_iter().flatten() {
                let result = service.add_symbol(symbol).await?;
                if let Resource::Error { error, .. } = &result {
                    warn!("Added {} but could not fetch it: {}", symbol, error);
                }
            }
            print_result(&Resource::success(service.watchlist().await), &market);
        }
        Some(("remove", sub)) => {
            let service = WatchlistService::start(components.synchronizer, components.repository).await;
            for symbol in sub.values_of("symbol").into_iter().flatten() {
                if !service.remove_symbol(symbol).await? {
                    warn!("{} is not in the watchlist", symbol);
                }
            }
            print_result(&Resource::success(service.watchlist().await), &market);
        }
        Some(("list", _)) => {
            let service = WatchlistService::start(components.synchronizer, components.repository).await;
            print_result(&Resource::success(service.watchlist().await), &market);
        }
        Some(("refresh", _)) => {
            let service = WatchlistService::start(components.synchronizer, components.repository).await;
            print_result(&service.refresh_now().await, &market);
        }
        _ => info!("No command specified. Use --help for usage information."),
    }

    Ok(())
}

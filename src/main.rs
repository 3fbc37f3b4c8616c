//! Dip-arbitrage bot entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use polymarket_dip_arb::adapters::clob::build_http_client;
use polymarket_dip_arb::adapters::{
    ClobExecutionClient, ExecutionAdapter, HttpSettlementClient, SettlementAdapter,
    SimulatedAdapter,
};
use polymarket_dip_arb::api::{create_router, AppState};
use polymarket_dip_arb::config::Config;
use polymarket_dip_arb::engine::{DipArbEngine, EngineEvent, Signal};
use polymarket_dip_arb::market::{MarketDiscovery, MarketQuery};
use polymarket_dip_arb::metrics;
use polymarket_dip_arb::orderbook::{default_arb_threshold, walk_fill, OrderbookService, PairMetrics};
use polymarket_dip_arb::rotation::RotationSupervisor;
use polymarket_dip_arb::transport::{RealtimeFeed, ReconnectConfig};
use polymarket_dip_arb::utils::shutdown_signal;

/// Dip-arbitrage bot for short-duration up/down markets.
#[derive(Parser, Debug)]
#[command(name = "polymarket-dip-arb")]
#[command(about = "Dip-arbitrage bot for short-duration up/down markets")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine with auto-rotation (default).
    Run {
        /// Run in dry-run mode (no real orders).
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/status.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Scan upcoming markets for the configured underlyings.
    Discover,

    /// Show pair books and arbitrage metrics for one market slug.
    Books {
        /// Market slug, e.g. btc-updown-15m-1765301400.
        slug: String,
    },

    /// Test the WebSocket feed (diagnostic).
    WsTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("polymarket_dip_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Discover) => cmd_discover().await,
        Some(Command::Books { slug }) => cmd_books(&slug).await,
        Some(Command::WsTest) => cmd_ws_test().await,
        Some(Command::Run { dry_run, port }) => cmd_run(dry_run, port).await,
        None => cmd_run(None, None).await,
    }
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DIP-ARB BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("configuration validation failed"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Underlyings: {:?}", config.parsed_underlyings());
    println!("  Duration: {}", config.market_duration);
    println!("  Shares per leg: {}", config.shares);
    println!("  Sum target: {}", config.sum_target);
    println!("  Dip threshold: {}", config.dip_threshold);
    println!("  Auto execute: {}", config.auto_execute);
    println!("  Settle strategy: {}", config.settle_strategy);
    println!("  Dry run: {}", config.dry_run);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Scan upcoming markets.
async fn cmd_discover() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    let http = build_http_client(30_000, config.http_pool_size);
    let discovery = MarketDiscovery::new(http, config.gamma_url.clone());

    let query = MarketQuery {
        underlyings: config.parsed_underlyings(),
        durations: vec![config.market_duration],
        min_minutes_until_end: 1,
        max_minutes_until_end: 30,
        ..MarketQuery::default()
    };

    println!("Scanning upcoming markets...\n");
    let markets = discovery.scan(&query).await?;

    if markets.is_empty() {
        println!("No upcoming markets found.");
        return Ok(());
    }

    for market in markets {
        println!(
            "{}  ends in {}  up={}  down={}",
            market.slug,
            market.time_remaining_str(),
            &market.up_token_id[..16.min(market.up_token_id.len())],
            &market.down_token_id[..16.min(market.down_token_id.len())],
        );
    }

    Ok(())
}

/// Show pair books and arbitrage metrics for one slug.
async fn cmd_books(slug: &str) -> anyhow::Result<()> {
    let config = Config::load()?;

    let http = build_http_client(30_000, config.http_pool_size);
    let discovery = MarketDiscovery::new(http.clone(), config.gamma_url.clone());
    let orderbooks = OrderbookService::new(http, config.clob_url.clone());

    let gamma = discovery
        .fetch_by_slug(slug)
        .await?
        .ok_or_else(|| anyhow::anyhow!("market {slug} not found"))?;
    let market = gamma.into_market()?;

    println!("Market: {} ({})", market.slug, market.time_remaining_str());

    let (up, down) = orderbooks.pair_books(&market).await?;
    match PairMetrics::compute(&up, &down) {
        Some(metrics) => {
            println!("{metrics}");
            println!("Assessment: {:?}", metrics.classify(default_arb_threshold()));
        }
        None => println!("Pair books are missing a top of book."),
    }

    for (label, book) in [("UP", &up), ("DOWN", &down)] {
        match walk_fill(&book.asks, config.shares) {
            Ok(estimate) => println!(
                "{label} fill for {} shares: vwap={} worst={} cost={}",
                config.shares, estimate.vwap, estimate.worst_price, estimate.total_cost
            ),
            Err(e) => println!("{label} fill for {} shares: {e}", config.shares),
        }
    }

    Ok(())
}

/// Connect the feed and print traffic for ten seconds.
async fn cmd_ws_test() -> anyhow::Result<()> {
    let config = Config::load()?;

    let http = build_http_client(30_000, config.http_pool_size);
    let discovery = MarketDiscovery::new(http, config.gamma_url.clone());

    println!("1. Discovering a market to subscribe...");
    let query = MarketQuery {
        underlyings: config.parsed_underlyings(),
        durations: vec![config.market_duration],
        min_minutes_until_end: 1,
        max_minutes_until_end: 30,
        ..MarketQuery::default()
    };
    let market = discovery
        .scan(&query)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no upcoming market found"))?;
    println!("   Found: {}", market.slug);

    println!("2. Connecting to WebSocket...");
    let feed = RealtimeFeed::spawn(
        config.ws_url.clone(),
        ReconnectConfig::from_config(config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s),
    );
    let mut books = feed.subscribe_books(&[
        market.up_token_id.clone(),
        market.down_token_id.clone(),
    ]);
    let mut oracle = feed.subscribe_oracle(&[market.underlying.oracle_symbol()]);

    let connected = feed.wait_until_connected(Duration::from_secs(10)).await;
    println!("   Connected: {}", connected);

    println!("3. Listening for 10 seconds...");
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let mut book_count = 0u32;
    let mut oracle_count = 0u32;

    loop {
        tokio::select! {
            Some(book) = books.rx.recv() => {
                book_count += 1;
                if book_count <= 3 {
                    println!(
                        "   book {}: bid={:?} ask={:?}",
                        &book.token_id[..12.min(book.token_id.len())],
                        book.best_bid(),
                        book.best_ask()
                    );
                }
            }
            Some(tick) = oracle.rx.recv() => {
                oracle_count += 1;
                if oracle_count <= 3 {
                    println!("   oracle {}: {}", tick.symbol, tick.price);
                }
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    println!("======================================================================");
    println!("WEBSOCKET TEST COMPLETE");
    println!("  Book updates: {}", book_count);
    println!("  Oracle ticks: {}", oracle_count);
    println!("  Reconnects: {}", feed.reconnect_attempts());
    println!("======================================================================");

    Ok(())
}

/// Run the engine with auto-rotation.
async fn cmd_run(dry_run_override: Option<bool>, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("invalid configuration: {}", e);
        return Err(anyhow::anyhow!("configuration validation failed: {}", e));
    }

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE TRADING" },
        underlyings = ?config.parsed_underlyings(),
        duration = %config.market_duration,
        "configuration loaded"
    );

    let http = build_http_client(config.http_timeout_ms, config.http_pool_size);
    let discovery = Arc::new(MarketDiscovery::new(http.clone(), config.gamma_url.clone()));
    let orderbooks = Arc::new(OrderbookService::new(http.clone(), config.clob_url.clone()));

    let (execution, settlement): (Arc<dyn ExecutionAdapter>, Arc<dyn SettlementAdapter>) =
        if config.dry_run {
            let sim = Arc::new(SimulatedAdapter::new());
            (sim.clone(), sim)
        } else {
            (
                Arc::new(ClobExecutionClient::new(http.clone(), config.clob_url.clone())),
                Arc::new(HttpSettlementClient::new(
                    http.clone(),
                    config.settlement_url.clone(),
                )),
            )
        };

    let feed = RealtimeFeed::spawn(
        config.ws_url.clone(),
        ReconnectConfig::from_config(config.ws_reconnect_max_delay_s, config.ws_heartbeat_interval_s),
    );

    let engine = DipArbEngine::new(
        Some(feed),
        execution.clone(),
        settlement.clone(),
        config.engine_settings(),
    );

    let supervisor = RotationSupervisor::new(
        engine.clone(),
        discovery.clone(),
        execution,
        settlement,
        orderbooks,
    );

    // HTTP surface
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("http server listening on {}", addr);
    let router = create_router(AppState::new(engine.clone()));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;
    });

    // Event log
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    // Find the first market, retrying until one shows up.
    let query = MarketQuery {
        underlyings: config.parsed_underlyings(),
        durations: vec![config.market_duration],
        min_minutes_until_end: 1,
        max_minutes_until_end: 30,
        ..MarketQuery::default()
    };

    let first_market = loop {
        match discovery.scan(&query).await {
            Ok(markets) if !markets.is_empty() => {
                break markets.into_iter().next().expect("non-empty scan");
            }
            Ok(_) => warn!("no upcoming market found, retrying in 30s"),
            Err(e) => warn!(error = %e, "discovery failed, retrying in 30s"),
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
    };

    info!(market = %first_market.slug, "starting engine");
    engine
        .start(first_market)
        .await
        .map_err(|e| anyhow::anyhow!("engine start failed: {e}"))?;

    supervisor
        .enable_rotation(config.rotation_settings())
        .map_err(|e| anyhow::anyhow!("rotation enable failed: {e}"))?;

    shutdown_signal().await;

    info!("shutting down");
    supervisor.disable_rotation();
    engine.stop().await;

    let stats = engine.statistics();
    info!(
        rounds_monitored = stats.rounds_monitored,
        rounds_completed = stats.rounds_completed,
        rounds_expired = stats.rounds_expired,
        signals = stats.signals_detected,
        total_spent = %stats.total_spent,
        total_profit = %stats.total_profit,
        "final statistics"
    );

    Ok(())
}

/// Log one engine event at an appropriate level.
fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Started { market } => {
            info!(market = %market.slug, "monitoring started");
        }
        EngineEvent::Stopped => info!("monitoring stopped"),
        EngineEvent::NewRound {
            round_id,
            price_to_beat,
            up_open,
            down_open,
            ..
        } => {
            info!(round = round_id, %price_to_beat, %up_open, %down_open, "new round");
        }
        EngineEvent::Signal(Signal::Entry(signal)) => {
            info!(
                round = signal.round_id,
                side = %signal.side,
                source = %signal.source,
                price = %signal.current_price,
                drop = %signal.drop_percent,
                target = %signal.target_price,
                "entry signal"
            );
        }
        EngineEvent::Signal(Signal::Hedge(signal)) => {
            info!(
                round = signal.round_id,
                side = %signal.side,
                total_cost = %signal.total_cost,
                profit_rate = %signal.expected_profit_rate,
                "hedge signal"
            );
        }
        EngineEvent::Execution(report) => {
            if report.success {
                info!(
                    leg = %report.leg,
                    round = report.round_id,
                    fill = ?report.fill_price,
                    shares = %report.shares,
                    elapsed_ms = report.elapsed_ms,
                    "execution succeeded"
                );
            } else {
                warn!(
                    leg = %report.leg,
                    round = report.round_id,
                    error = ?report.error,
                    "execution failed"
                );
            }
        }
        EngineEvent::RoundComplete(report) => {
            info!(
                round = report.round_id,
                status = %report.status,
                total_cost = %report.total_cost,
                profit = %report.profit,
                merged = report.merged,
                "round complete"
            );
        }
        EngineEvent::PriceUpdate {
            underlying,
            value,
            change_percent,
            ..
        } => {
            tracing::debug!(%underlying, %value, change = %change_percent, "oracle tick");
        }
        EngineEvent::Rotated {
            previous,
            next,
            reason,
            ..
        } => {
            info!(previous = ?previous, next = %next, reason = %reason, "rotated markets");
        }
        EngineEvent::Settled(report) => {
            info!(
                success = report.success,
                strategy = %report.strategy,
                amount = ?report.amount_received,
                "position settled"
            );
        }
        EngineEvent::Error {
            code,
            message,
            retryable,
        } => {
            error!(code, retryable, "{message}");
        }
    }
}

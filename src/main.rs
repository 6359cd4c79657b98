//! Throne client
//!
//! Watches the game, submits bids and claims, and can replay the reference
//! round against an in-process ledger.
//!
//! ## Commands
//!
//! - **watch**: poll + subscribe, log every snapshot until Ctrl-C
//! - **initialize / usurp / claim / broadcast**: sign and submit with the
//!   configured keypair
//! - **simulate**: three players, one stale bid, on a local ledger

#![warn(unused_imports)]
#![warn(unused_mut)]
#![warn(dead_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use throne::config::Config;
use throne::constants::LAMPORTS_PER_SOL;
use throne::event::BidMessage;
use throne::ledger::LocalLedger;
use throne::metrics::metrics;
use throne::reconciler::{ChainSnapshot, Reconciler};
use throne::rpc::{ChainClient, SolanaRpcClient};
use throne::streaming::EventStream;
use throne::tx_builder::{GameAction, SubmissionError, Submitter, TxBuilder};
use throne::wallet::WalletManager;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON (overrides `monitoring.json_logs`)
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the game and log every change
    Watch,
    /// Create the game; the signer becomes fee beneficiary
    Initialize {
        /// Opening price in lamports (defaults to `program.start_price_lamports`)
        #[arg(long)]
        price: Option<u64>,
    },
    /// Outbid the current holder
    Usurp {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Collect the jackpot after the deadline
    Claim,
    /// Publish a message without bidding
    Broadcast { message: String },
    /// Replay the reference round on a local ledger
    Simulate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;
    init_logging(args.verbose, args.json || config.monitoring.json_logs)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting throne client");

    let result = match args.command {
        Command::Watch => watch_game(&config).await,
        Command::Initialize { price } => {
            let start_price = price.unwrap_or(config.program.start_price_lamports);
            submit(&config, |_| Ok(GameAction::Initialize { start_price }), None).await
        }
        Command::Usurp { message } => {
            let message = message
                .map(|text| parse_message(&config, &text))
                .transpose()?;
            submit(
                &config,
                |view| match view {
                    Some(account) => Ok(GameAction::usurp_from(&account)),
                    None => bail!("game is not initialized"),
                },
                message,
            )
            .await
        }
        Command::Claim => submit(&config, |_| Ok(GameAction::Claim), None).await,
        Command::Broadcast { message } => {
            let message = parse_message(&config, &message)?;
            submit(&config, |_| Ok(GameAction::Broadcast), Some(message)).await
        }
        Command::Simulate => simulate(&config).await,
    };

    if config.monitoring.enable_metrics {
        tracing::debug!(metrics = %metrics().render(), "Final metrics");
    }
    result
}

/// Validate a message, also against the configured length cap
fn parse_message(config: &Config, text: &str) -> Result<BidMessage> {
    let message = BidMessage::new(text)?;
    if message.as_str().chars().count() > config.submission.max_message_len {
        bail!(
            "message longer than {} characters",
            config.submission.max_message_len
        );
    }
    Ok(message)
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose { "throne=debug,info" } else { "throne=info,warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

fn rpc_client(config: &Config) -> Result<Arc<SolanaRpcClient>> {
    Ok(Arc::new(SolanaRpcClient::new(
        config.rpc.url.clone(),
        config.commitment()?,
        config.rpc_timeout(),
        config.rpc.rate_limit_rps,
    )))
}

async fn watch_game(config: &Config) -> Result<()> {
    let client: Arc<dyn ChainClient> = rpc_client(config)?;
    let program_id = config.program_id()?;
    let reconciler = Arc::new(Reconciler::new(
        client,
        program_id,
        config.reconciler_config(),
    ));
    let stream = push_stream(config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut snapshots = reconciler.subscribe();
    let runner = tokio::spawn(Arc::clone(&reconciler).run(stream, shutdown_rx));
    info!(program_id = %program_id, rpc = %config.rpc.url, "Watching game");

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                report(&snapshot);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    // Receiver may already be gone if the runner exited
    let _ = shutdown_tx.send(true);
    runner.await.context("reconciler task panicked")?;
    Ok(())
}

#[cfg(feature = "ws-stream")]
fn push_stream(config: &Config) -> Result<Option<Arc<dyn EventStream>>> {
    if !config.reconciler.enable_push {
        return Ok(None);
    }
    let stream: Arc<dyn EventStream> = Arc::new(throne::streaming::WebSocketEventStream::new(
        config.rpc.ws_url.clone(),
        config.commitment()?,
    ));
    Ok(Some(stream))
}

#[cfg(not(feature = "ws-stream"))]
fn push_stream(_config: &Config) -> Result<Option<Arc<dyn EventStream>>> {
    Ok(None)
}

fn report(snapshot: &ChainSnapshot) {
    let now = chrono::Utc::now().timestamp();
    match snapshot.view.account() {
        Some(game) => info!(
            holder = %game.title_holder,
            price_sol = game.price as f64 / LAMPORTS_PER_SOL as f64,
            jackpot_sol = game.jackpot as f64 / LAMPORTS_PER_SOL as f64,
            seconds_left = game.seconds_remaining(now),
            "Throne"
        ),
        None => info!(state = snapshot.view.label(), "No active game"),
    }
    for event in &snapshot.history {
        info!(
            signature = %event.signature,
            new_holder = %event.new_holder,
            price = event.price,
            timestamp = event.timestamp,
            message = event.message.as_ref().map(|m| m.as_str()).unwrap_or(""),
            "History"
        );
    }
    if let Some(advisory) = &snapshot.advisory {
        warn!(advisory = %advisory, "Read path degraded");
    }
}

async fn submit(
    config: &Config,
    action_for: impl FnOnce(Option<throne::GameAccount>) -> Result<GameAction>,
    message: Option<BidMessage>,
) -> Result<()> {
    let keypair_path = config.keypair_path();
    let wallet = Arc::new(
        WalletManager::from_file(&keypair_path)
            .with_context(|| format!("Failed to load wallet from {}", keypair_path))?,
    );
    info!(wallet = %wallet.pubkey(), "Wallet loaded");

    let rpc = rpc_client(config)?;
    let client: Arc<dyn ChainClient> = rpc;
    let program_id = config.program_id()?;

    let reconciler = Reconciler::new(client.clone(), program_id, config.reconciler_config());
    reconciler
        .refresh_account()
        .await
        .context("Failed to read the game account")?;
    let action = action_for(reconciler.account())?;

    let builder = Arc::new(TxBuilder::new(program_id, wallet));
    let submitter = Submitter::new(client, builder, config.confirm_poll_interval());
    let pending = submitter.submit(action, message);
    info!(
        action = action.name(),
        correlation_id = %pending.trace.correlation_id(),
        "Submitted"
    );

    match pending.outcome().await {
        Ok(signature) => {
            info!(signature = %signature, "Confirmed");
            Ok(())
        }
        Err(e) if !e.should_surface() => {
            info!("Signature declined, nothing sent");
            Ok(())
        }
        Err(e @ SubmissionError::Expired { .. }) => {
            bail!("{e}; the transaction may be resubmitted")
        }
        Err(e) => Err(e.into()),
    }
}

/// Local ledger running the configured claim policy
fn simulation_ledger(config: &Config) -> Arc<LocalLedger> {
    Arc::new(LocalLedger::new(
        Pubkey::new_unique(),
        config.program_config(),
        chrono::Utc::now().timestamp(),
    ))
}

async fn simulate(config: &Config) -> Result<()> {
    let ledger = simulation_ledger(config);
    let client: Arc<dyn ChainClient> = ledger.clone();
    let player = |label: &str| {
        let wallet = Arc::new(WalletManager::from_keypair(Keypair::new()));
        ledger.airdrop(&wallet.pubkey(), LAMPORTS_PER_SOL);
        info!(player = label, key = %wallet.pubkey(), "Funded player");
        let builder = Arc::new(TxBuilder::new(ledger.program_id(), wallet.clone()));
        (
            wallet.pubkey(),
            Submitter::new(client.clone(), builder, std::time::Duration::from_millis(50)),
        )
    };
    let (a, a_tx) = player("A");
    let (b, b_tx) = player("B");
    let (_, c_tx) = player("C");

    a_tx.submit(
        GameAction::Initialize {
            start_price: config.program.start_price_lamports,
        },
        None,
    )
    .outcome()
    .await?;

    let bid = |previous_holder: Pubkey| GameAction::Usurp {
        previous_holder,
        fee_beneficiary: a,
    };
    b_tx.submit(bid(a), Some(BidMessage::new("B was here")?))
        .outcome()
        .await?;
    ledger.advance_clock(60);

    match c_tx.submit(bid(a), None).outcome().await {
        Err(e) => info!(error = %e, "Stale bid rejected as expected"),
        Ok(signature) => bail!("stale bid landed: {signature}"),
    }
    c_tx.submit(bid(b), Some(BidMessage::new("C rules")?))
        .outcome()
        .await?;

    let reconciler = Reconciler::new(client, ledger.program_id(), Default::default());
    reconciler.poll_once().await?;
    let snapshot = reconciler.snapshot();
    report(&snapshot);

    if let Some(game) = snapshot.view.account() {
        println!(
            "holder {} | price {} | jackpot {} | beneficiary balance {}",
            game.title_holder,
            game.price,
            game.jackpot,
            ledger.balance(&a)
        );
    }
    for event in &snapshot.history {
        println!(
            "{} {} <- {} @ {} {}",
            event.timestamp,
            event.new_holder,
            event.previous_holder,
            event.price,
            event.message.as_ref().map(|m| m.as_str()).unwrap_or("")
        );
    }
    Ok(())
}

//! Client-side mirror of the game account and its recent history
//!
//! Two activities feed the mirror:
//! - a fixed-interval poll of the account, which also refreshes the history
//!   when it is empty or older than the history TTL;
//! - an optional push subscription whose events are merged immediately and
//!   trigger an out-of-band account refresh.
//!
//! Both may run at once. History merges are keyed by signature and account
//! views are applied only if their context slot is not older than the one
//! already mirrored, so interleaved writers never lose or regress state.
//! A rate-limit response closes a cooldown gate that suppresses every fetch
//! until it elapses; other transport failures only raise an advisory.

pub mod cooldown;
pub mod history;
pub mod snapshot;

pub use cooldown::RateLimitGate;
pub use history::HistoryBook;
pub use snapshot::{Advisory, ChainSnapshot, GameView};

use crate::account::{game_address, GameAccount};
use crate::constants::RATE_LIMIT_COOLDOWN_SECS;
use crate::metrics::metrics;
use crate::rpc::{ChainClient, LogNotification, RpcManagerError};
use crate::streaming::EventStream;
use crate::structured_logging::StructuredLogger;
use parking_lot::Mutex;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

const PUSH_RETRY_MIN: Duration = Duration::from_secs(1);
const PUSH_RETRY_MAX: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub history_ttl: Duration,
    /// Signatures fetched per history refresh
    pub history_fetch_limit: usize,
    /// Entries exposed to renderers
    pub history_window: usize,
    pub rate_limit_cooldown: Duration,
    /// Consecutive failed polls before the advisory turns to degraded
    pub max_consecutive_failures: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(600),
            history_ttl: Duration::from_secs(10),
            history_fetch_limit: 5,
            history_window: 5,
            rate_limit_cooldown: Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS),
            max_consecutive_failures: 5,
        }
    }
}

/// Result of a poll that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Account (and possibly history) fetched
    Refreshed { history_refreshed: bool },
    /// Skipped: rate-limit cooldown still active
    CoolingDown { remaining: Duration },
}

pub struct Reconciler {
    client: Arc<dyn ChainClient>,
    program_id: Pubkey,
    game_address: Pubkey,
    config: ReconcilerConfig,
    history: HistoryBook,
    gate: RateLimitGate,
    view: Mutex<GameView>,
    last_history_refresh: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
    advisory: Mutex<Option<Advisory>>,
    snapshots: watch::Sender<ChainSnapshot>,
    refresh_requested: Notify,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ChainClient>, program_id: Pubkey, config: ReconcilerConfig) -> Self {
        let (snapshots, _) = watch::channel(ChainSnapshot::default());
        Self {
            client,
            program_id,
            game_address: game_address(&program_id).0,
            history: HistoryBook::new(config.history_window),
            config,
            gate: RateLimitGate::new(),
            view: Mutex::new(GameView::Unknown),
            last_history_refresh: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            advisory: Mutex::new(None),
            snapshots,
            refresh_requested: Notify::new(),
            logger: StructuredLogger::new("reconciler"),
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Receiver that observes every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ChainSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            view: *self.view.lock(),
            history: self.history.snapshot(),
            advisory: self.advisory.lock().clone(),
        }
    }

    pub fn view(&self) -> GameView {
        *self.view.lock()
    }

    pub fn account(&self) -> Option<GameAccount> {
        self.view.lock().account().copied()
    }

    pub fn advisory(&self) -> Option<Advisory> {
        self.advisory.lock().clone()
    }

    /// One poll tick: the account, then the history if it is due
    pub async fn poll_once(&self) -> Result<PollOutcome, RpcManagerError> {
        if let Some(remaining) = self.gate.remaining() {
            debug!(remaining_ms = remaining.as_millis() as u64, "Poll skipped, cooling down");
            return Ok(PollOutcome::CoolingDown { remaining });
        }
        metrics().polls_total.inc();

        let result = self.poll_inner().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(e) => self.record_failure(e),
        }
        self.publish();
        result
    }

    async fn poll_inner(&self) -> Result<PollOutcome, RpcManagerError> {
        let view = self.fetch_view().await?;
        let history_due = matches!(view, GameView::Active { .. }) && self.history_due();
        if history_due {
            self.refresh_history().await?;
        }
        Ok(PollOutcome::Refreshed {
            history_refreshed: history_due,
        })
    }

    /// Account-only refresh, as triggered by a pushed event
    pub async fn refresh_account(&self) -> Result<(), RpcManagerError> {
        if self.gate.remaining().is_some() {
            return Ok(());
        }
        let result = self.fetch_view().await.map(|_| ());
        match &result {
            Ok(()) => self.record_success(),
            Err(e) => self.record_failure(e),
        }
        self.publish();
        result
    }

    fn history_due(&self) -> bool {
        if self.history.is_empty() {
            return true;
        }
        self.last_history_refresh
            .lock()
            .map_or(true, |at| at.elapsed() >= self.config.history_ttl)
    }

    async fn fetch_view(&self) -> Result<GameView, RpcManagerError> {
        let snapshot = match self.client.fetch_account(&self.game_address).await {
            Ok(snapshot) => snapshot,
            // Some providers answer a missing account with an error. It
            // carries no context slot, so it never displaces an active view.
            Err(RpcManagerError::AccountNotFound { .. }) => {
                let mut current = self.view.lock();
                if matches!(*current, GameView::Active { .. }) {
                    debug!("Ignoring unslotted account-not-found, keeping active view");
                } else {
                    *current = GameView::Uninitialized;
                }
                return Ok(*current);
            }
            Err(e) => return Err(e),
        };

        let view = match snapshot.data {
            None => GameView::Uninitialized,
            Some(data) => {
                let account = GameAccount::decode(&data)
                    .map_err(|e| RpcManagerError::Decode(format!("game account: {}", e)))?;
                GameView::Active {
                    account,
                    slot: snapshot.slot,
                }
            }
        };
        Ok(self.apply_view(view, snapshot.slot))
    }

    /// Install `view` unless a newer one is already mirrored. Returns the
    /// view in effect afterwards.
    fn apply_view(&self, view: GameView, slot: u64) -> GameView {
        let mut current = self.view.lock();
        if let Some(mirrored) = current.slot() {
            if slot < mirrored {
                debug!(slot, mirrored, "Discarding stale account view");
                return *current;
            }
        }
        if current.label() != view.label() {
            self.logger
                .log_account_transition(current.label(), view.label(), slot);
        }
        *current = view;
        if let Some(slot) = view.slot() {
            metrics().observed_slot.set(slot as i64);
        }
        view
    }

    async fn refresh_history(&self) -> Result<(), RpcManagerError> {
        let signatures = self
            .client
            .recent_signatures(&self.game_address, self.config.history_fetch_limit)
            .await?;

        let mut batch = Vec::with_capacity(signatures.len());
        for info in signatures.iter().filter(|info| !info.failed) {
            if let Some(record) = self.client.fetch_transaction(&info.signature).await? {
                batch.extend(record.game_event());
            }
        }

        *self.last_history_refresh.lock() = Some(Instant::now());
        self.merge("poll", batch);
        Ok(())
    }

    fn merge(&self, source: &str, batch: Vec<crate::event::GameEvent>) {
        let incoming = batch.len();
        let added = self.history.merge(batch);
        metrics().history_merges.inc_by(incoming as u64);
        metrics().history_size.set(self.history.len() as i64);
        let listed = self.history.snapshot();
        self.logger
            .log_history_merge(source, incoming, added, listed.first());
    }

    /// Merge a pushed notification and ask for an account refresh
    pub fn ingest(&self, notification: LogNotification) {
        let Some(event) = notification.game_event() else {
            return;
        };
        metrics().pushed_events.inc();
        info!(
            signature = %event.signature,
            new_holder = %event.new_holder,
            price = event.price,
            "Throne usurped"
        );
        self.merge("push", vec![event]);
        self.publish();
        self.refresh_requested.notify_one();
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.advisory.lock() = None;
    }

    fn record_failure(&self, err: &RpcManagerError) {
        metrics().poll_failures.inc();
        let advisory = if err.is_rate_limited() {
            let cooldown = self.config.rate_limit_cooldown;
            self.gate.trip(cooldown);
            metrics().rate_limit_cooldowns.inc();
            self.logger
                .log_cooldown(err.endpoint().unwrap_or("unknown"), cooldown.as_secs());
            Advisory::RateLimited { retry_in: cooldown }
        } else {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(error = %err, failures, "Poll failed");
            if failures >= self.config.max_consecutive_failures {
                Advisory::Degraded {
                    consecutive_failures: failures,
                }
            } else if err.is_unreachable() {
                Advisory::Unreachable {
                    endpoint: err
                        .endpoint()
                        .map(str::to_string)
                        .unwrap_or_else(|| self.client.endpoint()),
                }
            } else {
                Advisory::ReadError {
                    message: err.to_string(),
                }
            }
        };
        *self.advisory.lock() = Some(advisory);
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Open a fresh push channel, `None` if the stream refused
    async fn open_push(
        &self,
        stream: &Arc<dyn EventStream>,
    ) -> Option<mpsc::UnboundedReceiver<LogNotification>> {
        let (tx, rx) = mpsc::unbounded_channel();
        match stream.subscribe(&self.program_id, tx).await {
            Ok(()) => {
                info!(program_id = %self.program_id, "Push subscription open");
                Some(rx)
            }
            Err(e) => {
                self.logger.log_push_lost(Some(e.to_string()));
                None
            }
        }
    }

    /// Drive polling and the optional push path until `shutdown` flips to
    /// `true` or its sender is dropped.
    ///
    /// A refused or closed subscription is reopened with exponential
    /// backoff, never while the rate-limit gate is closed.
    pub async fn run(
        self: Arc<Self>,
        stream: Option<Arc<dyn EventStream>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut push_rx = None;
        let mut push_backoff = PUSH_RETRY_MIN;
        let mut push_retry_at = Instant::now();
        if let Some(stream) = &stream {
            push_rx = self.open_push(stream).await;
            push_retry_at = Instant::now() + push_backoff;
        }

        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are reflected in the advisory
                    let _ = self.poll_once().await;
                }
                maybe = next_push(&mut push_rx), if push_rx.is_some() => match maybe {
                    Some(notification) => self.ingest(notification),
                    None => {
                        push_rx = None;
                        push_backoff = PUSH_RETRY_MIN;
                        push_retry_at = Instant::now() + push_backoff;
                        self.logger.log_push_lost(None);
                    }
                },
                _ = tokio::time::sleep_until(push_retry_at), if stream.is_some() && push_rx.is_none() => {
                    if let Some(remaining) = self.gate.remaining() {
                        push_retry_at = Instant::now() + remaining;
                    } else if let Some(stream) = &stream {
                        push_rx = self.open_push(stream).await;
                        if push_rx.is_some() {
                            push_backoff = PUSH_RETRY_MIN;
                        } else {
                            push_backoff = (push_backoff * 2).min(PUSH_RETRY_MAX);
                            push_retry_at = Instant::now() + push_backoff;
                        }
                    }
                }
                _ = self.refresh_requested.notified() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        let _ = this.refresh_account().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Reconciler stopping");
                        break;
                    }
                }
            }
        }
    }
}

async fn next_push(
    rx: &mut Option<mpsc::UnboundedReceiver<LogNotification>>,
) -> Option<LogNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

//! Reconciler behaviour against the local ledger: views, history TTL,
//! rate-limit cooldown and failure advisories

use super::test_helpers::*;
use crate::ledger::Fault;
use crate::reconciler::{Advisory, GameView, PollOutcome, Reconciler, ReconcilerConfig};
use crate::streaming::EventStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn reconciler(ledger: &Arc<crate::ledger::LocalLedger>) -> Reconciler {
    Reconciler::new(client(ledger), ledger.program_id(), ReconcilerConfig::default())
}

#[tokio::test]
async fn test_fresh_ledger_is_uninitialized() {
    let ledger = ledger();
    let reconciler = reconciler(&ledger);
    assert_eq!(reconciler.view(), GameView::Unknown);

    let outcome = reconciler.poll_once().await.unwrap();

    assert_eq!(
        outcome,
        PollOutcome::Refreshed {
            history_refreshed: false
        }
    );
    assert_eq!(reconciler.view(), GameView::Uninitialized);
    assert!(reconciler.snapshot().history.is_empty());
    assert_eq!(reconciler.advisory(), None);
}

#[tokio::test]
async fn test_poll_mirrors_account_and_history() {
    let (ledger, creator) = initialized_game().await;
    let alice = player(&ledger, 5);
    let bob = player(&ledger, 5);
    bid(&ledger, &alice, Some("first")).await.unwrap();
    ledger.advance_clock(30);
    bid(&ledger, &bob, None).await.unwrap();

    let reconciler = reconciler(&ledger);
    reconciler.poll_once().await.unwrap();

    let account = reconciler.account().unwrap();
    assert_eq!(account, ledger.game_account().unwrap());
    assert_eq!(account.fee_beneficiary, creator.pubkey());

    let history = reconciler.snapshot().history;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].new_holder, bob.pubkey());
    assert_eq!(history[0].message, None);
    assert_eq!(history[1].new_holder, alice.pubkey());
    assert_eq!(history[1].previous_holder, creator.pubkey());
    assert_eq!(history[1].message.as_ref().map(|m| m.as_str()), Some("first"));
}

#[tokio::test]
async fn test_history_window_keeps_newest() {
    let (ledger, _creator) = initialized_game().await;
    let mut holders = vec![];
    for _ in 0..7 {
        let p = player(&ledger, 50);
        ledger.advance_clock(1);
        bid(&ledger, &p, None).await.unwrap();
        holders.push(p.pubkey());
    }

    let reconciler = reconciler(&ledger);
    reconciler.poll_once().await.unwrap();

    let listed: Vec<_> = reconciler
        .snapshot()
        .history
        .iter()
        .map(|e| e.new_holder)
        .collect();
    let expected: Vec<_> = holders.iter().rev().take(5).copied().collect();
    assert_eq!(listed, expected);
}

#[tokio::test(start_paused = true)]
async fn test_history_respects_ttl() {
    let (ledger, _creator) = initialized_game().await;
    let alice = player(&ledger, 5);
    let bob = player(&ledger, 5);
    bid(&ledger, &alice, None).await.unwrap();

    let reconciler = reconciler(&ledger);
    assert_eq!(
        reconciler.poll_once().await.unwrap(),
        PollOutcome::Refreshed {
            history_refreshed: true
        }
    );

    ledger.advance_clock(5);
    bid(&ledger, &bob, None).await.unwrap();
    assert_eq!(
        reconciler.poll_once().await.unwrap(),
        PollOutcome::Refreshed {
            history_refreshed: false
        }
    );
    // Account is fresh, history is still the cached one
    assert_eq!(reconciler.account().unwrap().title_holder, bob.pubkey());
    assert_eq!(reconciler.snapshot().history.len(), 1);

    tokio::time::advance(Duration::from_secs(11)).await;
    reconciler.poll_once().await.unwrap();
    assert_eq!(reconciler.snapshot().history.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_suspends_fetches_for_cooldown() {
    let (ledger, _creator) = initialized_game().await;
    let reconciler = reconciler(&ledger);

    ledger.inject(Fault::RateLimited);
    let err = reconciler.poll_once().await.unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(
        reconciler.advisory(),
        Some(Advisory::RateLimited {
            retry_in: Duration::from_secs(15)
        })
    );

    // A queued fault would be consumed by any fetch; it must stay queued
    ledger.inject(Fault::Unreachable);
    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(matches!(
        reconciler.poll_once().await.unwrap(),
        PollOutcome::CoolingDown { .. }
    ));
    reconciler.refresh_account().await.unwrap();
    assert_eq!(reconciler.view(), GameView::Unknown);

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(reconciler.poll_once().await.unwrap_err().is_unreachable());
    reconciler.poll_once().await.unwrap();
    assert_eq!(reconciler.advisory(), None);
    assert!(matches!(reconciler.view(), GameView::Active { .. }));
}

#[tokio::test]
async fn test_repeated_failures_degrade_then_recover() {
    let (ledger, _creator) = initialized_game().await;
    let reconciler = reconciler(&ledger);

    ledger.inject(Fault::Unreachable);
    reconciler.poll_once().await.unwrap_err();
    assert_eq!(
        reconciler.advisory(),
        Some(Advisory::Unreachable {
            endpoint: "local".to_string()
        })
    );

    for _ in 0..4 {
        ledger.inject(Fault::Unreachable);
        reconciler.poll_once().await.unwrap_err();
    }
    assert_eq!(
        reconciler.advisory(),
        Some(Advisory::Degraded {
            consecutive_failures: 5
        })
    );

    reconciler.poll_once().await.unwrap();
    assert_eq!(reconciler.advisory(), None);
}

#[tokio::test]
async fn test_pushed_event_merges_with_polled_copy() {
    let (ledger, _creator) = initialized_game().await;
    let alice = player(&ledger, 5);
    let reconciler = reconciler(&ledger);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    ledger.subscribe(&ledger.program_id(), tx).await.unwrap();

    let signature = bid(&ledger, &alice, Some("hello")).await.unwrap();
    let pushed = rx.recv().await.unwrap();
    assert_eq!(pushed.signature, signature);

    reconciler.ingest(pushed.clone());
    let history = reconciler.snapshot().history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].message, None);

    // The poll fills in the message, a repeated push does not erase it
    reconciler.poll_once().await.unwrap();
    reconciler.ingest(pushed);
    let history = reconciler.snapshot().history;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].signature, signature);
    assert_eq!(history[0].message.as_ref().map(|m| m.as_str()), Some("hello"));
}

#[tokio::test]
async fn test_run_loop_follows_pushes_until_shutdown() {
    let (ledger, _creator) = initialized_game().await;
    let alice = player(&ledger, 5);
    let reconciler = Arc::new(reconciler(&ledger));
    let mut snapshots = reconciler.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stream: Arc<dyn EventStream> = ledger.clone();
    let handle = tokio::spawn(Arc::clone(&reconciler).run(Some(stream), shutdown_rx));

    // First tick fires immediately
    snapshots
        .wait_for(|s| matches!(s.view, GameView::Active { .. }))
        .await
        .unwrap();

    bid(&ledger, &alice, None).await.unwrap();
    snapshots
        .wait_for(|s| {
            s.history.len() == 1
                && s.view.account().map(|a| a.title_holder) == Some(alice.pubkey())
        })
        .await
        .unwrap();

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_resubscribes_after_refused_push() {
    let (ledger, _creator) = initialized_game().await;
    let alice = player(&ledger, 5);
    let config = ReconcilerConfig {
        // Only the push path can deliver the bid within the test window
        poll_interval: Duration::from_secs(86_400),
        ..ReconcilerConfig::default()
    };
    let reconciler = Arc::new(Reconciler::new(client(&ledger), ledger.program_id(), config));
    let mut snapshots = reconciler.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let flaky = Arc::new(FlakyStream::new(ledger.clone()));
    let stream: Arc<dyn EventStream> = flaky.clone();
    let handle = tokio::spawn(Arc::clone(&reconciler).run(Some(stream), shutdown_rx));

    while flaky.attempts() < 2 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    snapshots
        .wait_for(|s| matches!(s.view, GameView::Active { .. }))
        .await
        .unwrap();

    bid(&ledger, &alice, Some("pushed")).await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(60),
        snapshots.wait_for(|s| s.history.len() == 1),
    )
    .await
    .expect("bid arrives over the reopened subscription")
    .unwrap();
    assert_eq!(flaky.attempts(), 2);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unslotted_account_not_found_keeps_active_view() {
    let (ledger, _creator) = initialized_game().await;
    let provider = Arc::new(LaggingProvider::new(ledger.clone()));
    let reconciler = Reconciler::new(provider.clone(), ledger.program_id(), ReconcilerConfig::default());

    reconciler.poll_once().await.unwrap();
    let active = reconciler.view();
    assert!(matches!(active, GameView::Active { .. }));

    provider.set_lagging(true);
    reconciler.poll_once().await.unwrap();
    assert_eq!(reconciler.view(), active);
    assert_eq!(reconciler.advisory(), None);
}

#[tokio::test]
async fn test_account_not_found_error_means_uninitialized() {
    let ledger = ledger();
    let provider = Arc::new(LaggingProvider::new(ledger.clone()));
    provider.set_lagging(true);
    let reconciler = Reconciler::new(provider, ledger.program_id(), ReconcilerConfig::default());

    reconciler.poll_once().await.unwrap();
    assert_eq!(reconciler.view(), GameView::Uninitialized);
}

//! Reconciler against a live local ledger: push and poll paths converge on
//! one deduplicated history

use solana_sdk::{pubkey::Pubkey, signature::Keypair};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use throne::constants::LAMPORTS_PER_SOL;
use throne::reconciler::history::HistoryBook;
use throne::streaming::EventStream;
use throne::tx_builder::{GameAction, TxBuilder};
use throne::{
    BidMessage, ChainClient, GameEvent, GameView, LocalLedger, ProgramConfig, Reconciler,
    ReconcilerConfig, Signature, Submitter, WalletManager,
};
use tokio::sync::watch;

fn submitter(ledger: &Arc<LocalLedger>) -> (Pubkey, Submitter) {
    let wallet = Arc::new(WalletManager::from_keypair(Keypair::new()));
    ledger.airdrop(&wallet.pubkey(), 100 * LAMPORTS_PER_SOL);
    let client: Arc<dyn ChainClient> = ledger.clone();
    let builder = Arc::new(TxBuilder::new(ledger.program_id(), wallet.clone()));
    (
        wallet.pubkey(),
        Submitter::new(client, builder, Duration::from_millis(50)),
    )
}

#[tokio::test]
async fn push_and_poll_converge_without_duplicates() {
    let ledger = Arc::new(LocalLedger::new(
        Pubkey::new_unique(),
        ProgramConfig::default(),
        1_700_000_000,
    ));
    let (creator, creator_tx) = submitter(&ledger);
    creator_tx
        .submit(
            GameAction::Initialize {
                start_price: LAMPORTS_PER_SOL / 10,
            },
            None,
        )
        .outcome()
        .await
        .unwrap();

    let client: Arc<dyn ChainClient> = ledger.clone();
    let reconciler = Arc::new(Reconciler::new(
        client,
        ledger.program_id(),
        ReconcilerConfig {
            history_ttl: Duration::ZERO,
            ..ReconcilerConfig::default()
        },
    ));
    let mut snapshots = reconciler.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stream: Arc<dyn EventStream> = ledger.clone();
    let task = tokio::spawn(Arc::clone(&reconciler).run(Some(stream), shutdown_rx));

    snapshots
        .wait_for(|s| s.view == GameView::Uninitialized || s.view.account().is_some())
        .await
        .unwrap();

    let mut holder = creator;
    for round in 0..3 {
        let (key, bidder) = submitter(&ledger);
        ledger.advance_clock(10);
        bidder
            .submit(
                GameAction::Usurp {
                    previous_holder: holder,
                    fee_beneficiary: creator,
                },
                Some(BidMessage::new(format!("round {round}")).unwrap()),
            )
            .outcome()
            .await
            .unwrap();
        holder = key;
    }

    snapshots
        .wait_for(|s| s.history.len() == 3)
        .await
        .unwrap();
    reconciler.poll_once().await.unwrap();

    let snapshot = reconciler.snapshot();
    assert_eq!(snapshot.history.len(), 3);
    assert!(snapshot
        .history
        .windows(2)
        .all(|pair| pair[0].timestamp > pair[1].timestamp));
    assert_eq!(snapshot.history[0].new_holder, holder);
    let messages: Vec<_> = snapshot
        .history
        .iter()
        .map(|e| e.message.as_ref().map(|m| m.as_str().to_string()))
        .collect();
    assert_eq!(
        messages,
        vec![
            Some("round 2".to_string()),
            Some("round 1".to_string()),
            Some("round 0".to_string())
        ]
    );
    assert_eq!(snapshot.view.account().unwrap().title_holder, holder);

    shutdown_tx.send(true).unwrap();
    task.await.unwrap();
}

fn event(timestamp: i64, signature: Signature) -> GameEvent {
    GameEvent {
        signature,
        new_holder: Pubkey::new_unique(),
        previous_holder: Pubkey::new_unique(),
        price: 1,
        timestamp,
        message: None,
        slot: Some(timestamp as u64),
    }
}

#[test]
fn overlapping_batches_merge_to_unique_descending_history() {
    let sigs: Vec<Signature> = (0..6).map(|_| Signature::new_unique()).collect();
    let book = HistoryBook::new(10);

    book.merge((0..4).map(|i| event(100 + i, sigs[i as usize])));
    book.merge((2..6).map(|i| event(100 + i, sigs[i as usize])));

    let history = book.snapshot();
    assert_eq!(history.len(), 6);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].timestamp > pair[1].timestamp));
    let unique: HashSet<_> = history.iter().map(|e| e.signature).collect();
    assert_eq!(unique.len(), 6);
}

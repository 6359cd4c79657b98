//! Shared fixtures: a local ledger, funded players and signers that
//! misbehave on purpose

use crate::constants::{BLOCKHASH_VALIDITY_BLOCKS, LAMPORTS_PER_SOL};
use crate::event::BidMessage;
use crate::ledger::LocalLedger;
use crate::program::ProgramConfig;
use crate::rpc::{
    AccountSnapshot, ChainClient, LogNotification, RpcManagerError, SignatureInfo,
    TransactionRecord,
};
use crate::streaming::EventStream;
use crate::tx_builder::{GameAction, SignerError, TransactionSigner, TxBuilder};
use crate::tx_builder::{SubmissionError, Submitter};
use crate::wallet::WalletManager;
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    message::VersionedMessage,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::{TransactionError, VersionedTransaction},
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use std::time::Duration;

pub const START_PRICE: u64 = 100_000_000;
pub const GENESIS: i64 = 1_700_000_000;
pub const CONFIRM_POLL: Duration = Duration::from_millis(500);

pub fn ledger() -> Arc<LocalLedger> {
    Arc::new(LocalLedger::new(
        Pubkey::new_unique(),
        ProgramConfig::default(),
        GENESIS,
    ))
}

pub fn client(ledger: &Arc<LocalLedger>) -> Arc<dyn ChainClient> {
    ledger.clone()
}

/// A funded identity with its own submitter
pub struct Player {
    pub wallet: Arc<WalletManager>,
    pub submitter: Submitter,
}

impl Player {
    pub fn pubkey(&self) -> Pubkey {
        self.wallet.pubkey()
    }

    pub async fn act(
        &self,
        action: GameAction,
        message: Option<&str>,
    ) -> Result<Signature, SubmissionError> {
        let message = message.map(|m| BidMessage::new(m).unwrap());
        self.submitter.submit(action, message).outcome().await
    }
}

pub fn player(ledger: &Arc<LocalLedger>, sol: u64) -> Player {
    let wallet = Arc::new(WalletManager::from_keypair(Keypair::new()));
    ledger.airdrop(&wallet.pubkey(), sol * LAMPORTS_PER_SOL);
    let submitter = submitter_with(ledger, wallet.clone());
    Player { wallet, submitter }
}

pub fn submitter_with(ledger: &Arc<LocalLedger>, signer: Arc<dyn TransactionSigner>) -> Submitter {
    let builder = Arc::new(TxBuilder::new(ledger.program_id(), signer));
    Submitter::new(client(ledger), builder, CONFIRM_POLL)
}

/// Ledger with an initialized game and its creator
pub async fn initialized_game() -> (Arc<LocalLedger>, Player) {
    let ledger = ledger();
    let creator = player(&ledger, 1);
    creator
        .act(
            GameAction::Initialize {
                start_price: START_PRICE,
            },
            None,
        )
        .await
        .unwrap();
    (ledger, creator)
}

/// Bid against whatever the ledger currently holds
pub async fn bid(
    ledger: &LocalLedger,
    bidder: &Player,
    message: Option<&str>,
) -> Result<Signature, SubmissionError> {
    let view = ledger.game_account().unwrap();
    bidder.act(GameAction::usurp_from(&view), message).await
}

/// Refuses every request
pub struct DecliningSigner(pub Pubkey);

#[async_trait]
impl TransactionSigner for DecliningSigner {
    fn pubkey(&self) -> Pubkey {
        self.0
    }

    async fn sign_message(&self, _message: &VersionedMessage) -> Result<Signature, SignerError> {
        Err(SignerError::Declined)
    }
}

/// Approves only after the blockhash it was asked to sign has expired
pub struct SlowSigner {
    pub inner: Arc<WalletManager>,
    pub ledger: Arc<LocalLedger>,
}

#[async_trait]
impl TransactionSigner for SlowSigner {
    fn pubkey(&self) -> Pubkey {
        self.inner.pubkey()
    }

    async fn sign_message(&self, message: &VersionedMessage) -> Result<Signature, SignerError> {
        self.ledger.advance_blocks(BLOCKHASH_VALIDITY_BLOCKS + 1);
        self.inner.sign_message(message).await
    }
}

/// Ledger whose signature status endpoint answers every call with 429
pub struct StatusRateLimited {
    pub ledger: Arc<LocalLedger>,
    status_calls: AtomicU32,
}

impl StatusRateLimited {
    pub fn new(ledger: Arc<LocalLedger>) -> Self {
        Self {
            ledger,
            status_calls: AtomicU32::new(0),
        }
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for StatusRateLimited {
    fn endpoint(&self) -> String {
        "status-429".to_string()
    }

    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountSnapshot, RpcManagerError> {
        self.ledger.fetch_account(address).await
    }

    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcManagerError> {
        self.ledger.recent_signatures(address, limit).await
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcManagerError> {
        self.ledger.fetch_transaction(signature).await
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), RpcManagerError> {
        self.ledger.latest_blockhash().await
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        self.ledger.block_height().await
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, RpcManagerError> {
        self.ledger.send_transaction(tx).await
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcManagerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Err(RpcManagerError::RateLimitExceeded {
            endpoint: self.endpoint(),
        })
    }
}

/// Log subscription that refuses its first attempt, then forwards the
/// ledger's notifications
pub struct FlakyStream {
    pub ledger: Arc<LocalLedger>,
    attempts: AtomicU32,
}

impl FlakyStream {
    pub fn new(ledger: Arc<LocalLedger>) -> Self {
        Self {
            ledger,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStream for FlakyStream {
    async fn subscribe(
        &self,
        program_id: &Pubkey,
        tx: mpsc::UnboundedSender<LogNotification>,
    ) -> Result<(), RpcManagerError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(RpcManagerError::Subscription("handshake refused".to_string()));
        }
        self.ledger.subscribe(program_id, tx).await
    }
}

/// Ledger behind a provider that can start denying the game account
/// exists, the way a lagging node does
pub struct LaggingProvider {
    pub ledger: Arc<LocalLedger>,
    lagging: AtomicBool,
}

impl LaggingProvider {
    pub fn new(ledger: Arc<LocalLedger>) -> Self {
        Self {
            ledger,
            lagging: AtomicBool::new(false),
        }
    }

    pub fn set_lagging(&self, lagging: bool) {
        self.lagging.store(lagging, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for LaggingProvider {
    fn endpoint(&self) -> String {
        "lagging".to_string()
    }

    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountSnapshot, RpcManagerError> {
        if self.lagging.load(Ordering::SeqCst) {
            return Err(RpcManagerError::AccountNotFound {
                endpoint: self.endpoint(),
            });
        }
        self.ledger.fetch_account(address).await
    }

    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcManagerError> {
        self.ledger.recent_signatures(address, limit).await
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcManagerError> {
        self.ledger.fetch_transaction(signature).await
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), RpcManagerError> {
        self.ledger.latest_blockhash().await
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        self.ledger.block_height().await
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, RpcManagerError> {
        self.ledger.send_transaction(tx).await
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcManagerError> {
        self.ledger.signature_status(signature).await
    }
}

//! In-process host ledger
//!
//! [`LocalLedger`] hosts the auction program the way a cluster would:
//! lamport balances, a wall clock, block heights with expiring blockhashes,
//! signature verification, per-transaction logs and a signature index. Every
//! transaction executes under one lock on a scratch copy and commits only if
//! all its instructions succeed.
//!
//! It implements [`ChainClient`] and [`EventStream`], so the reconciler and
//! the submitter run against it unchanged. Faults can be queued to exercise
//! rate limits, outages and dropped transactions.

mod runtime;

use crate::account::{game_address, GameAccount, VersionedGame};
use crate::constants::BLOCKHASH_VALIDITY_BLOCKS;
use crate::program::ProgramConfig;
use crate::rpc::{
    AccountSnapshot, ChainClient, LogNotification, RpcManagerError, SignatureInfo,
    TransactionRecord,
};
use crate::streaming::EventStream;
use async_trait::async_trait;
use parking_lot::Mutex;
use runtime::Scratch;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::TransactionError,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

const NOTIFICATION_CAPACITY: usize = 1024;

/// Injected misbehaviour, consumed one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Next read answers with a rate-limit error
    RateLimited,
    /// Next read fails at the transport level
    Unreachable,
    /// Next send is acknowledged but the transaction never lands
    DropTransaction,
}

#[derive(Debug, Clone)]
struct Landed {
    record: TransactionRecord,
    error: Option<TransactionError>,
    account_keys: Vec<Pubkey>,
}

#[derive(Debug)]
struct LedgerState {
    balances: HashMap<Pubkey, u64>,
    game: Option<VersionedGame>,
    clock: i64,
    slot: u64,
    block_height: u64,
    latest_blockhash: Hash,
    /// Blockhash -> block height it was produced at
    blockhashes: HashMap<Hash, u64>,
    transactions: HashMap<Signature, Landed>,
    /// Landing order, oldest first
    order: Vec<Signature>,
    faults: VecDeque<Fault>,
}

impl LedgerState {
    fn produce_block(&mut self) {
        self.slot += 1;
        self.block_height += 1;
        self.latest_blockhash = Hash::new_unique();
        self.blockhashes
            .insert(self.latest_blockhash, self.block_height);
    }

    fn blockhash_valid(&self, hash: &Hash) -> bool {
        self.blockhashes
            .get(hash)
            .is_some_and(|produced| self.block_height <= produced + BLOCKHASH_VALIDITY_BLOCKS)
    }

    fn take_fault(&mut self, wanted: impl Fn(Fault) -> bool) -> Option<Fault> {
        let position = self.faults.iter().position(|f| wanted(*f))?;
        self.faults.remove(position)
    }
}

pub struct LocalLedger {
    program_id: Pubkey,
    game_address: Pubkey,
    config: ProgramConfig,
    state: Mutex<LedgerState>,
    notifications: broadcast::Sender<LogNotification>,
}

impl std::fmt::Debug for LocalLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalLedger")
            .field("program_id", &self.program_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocalLedger {
    pub fn new(program_id: Pubkey, config: ProgramConfig, genesis_time: i64) -> Self {
        let genesis_hash = Hash::new_unique();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            program_id,
            game_address: game_address(&program_id).0,
            config,
            state: Mutex::new(LedgerState {
                balances: HashMap::new(),
                game: None,
                clock: genesis_time,
                slot: 0,
                block_height: 0,
                latest_blockhash: genesis_hash,
                blockhashes: HashMap::from([(genesis_hash, 0)]),
                transactions: HashMap::new(),
                order: Vec::new(),
                faults: VecDeque::new(),
            }),
            notifications,
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn program_config(&self) -> ProgramConfig {
        self.config
    }

    pub fn game_address(&self) -> Pubkey {
        self.game_address
    }

    pub fn airdrop(&self, to: &Pubkey, lamports: u64) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(*to).or_insert(0);
        *balance = balance.saturating_add(lamports);
    }

    pub fn balance(&self, account: &Pubkey) -> u64 {
        self.state.lock().balances.get(account).copied().unwrap_or(0)
    }

    pub fn game(&self) -> Option<VersionedGame> {
        self.state.lock().game
    }

    /// Decoded game record, bypassing fault injection
    pub fn game_account(&self) -> Option<GameAccount> {
        self.game().map(|g| g.account)
    }

    pub fn clock(&self) -> i64 {
        self.state.lock().clock
    }

    pub fn set_clock(&self, unix_timestamp: i64) {
        self.state.lock().clock = unix_timestamp;
    }

    pub fn advance_clock(&self, secs: i64) {
        let mut state = self.state.lock();
        state.clock = state.clock.saturating_add(secs);
    }

    /// Produce `count` empty blocks
    pub fn advance_blocks(&self, count: u64) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.produce_block();
        }
    }

    pub fn inject(&self, fault: Fault) {
        self.state.lock().faults.push_back(fault);
    }

    /// Error a landed transaction failed with, if any
    pub fn transaction_error(&self, signature: &Signature) -> Option<TransactionError> {
        self.state
            .lock()
            .transactions
            .get(signature)
            .and_then(|landed| landed.error.clone())
    }

    fn read_fault(&self) -> Result<(), RpcManagerError> {
        let fault = self
            .state
            .lock()
            .take_fault(|f| matches!(f, Fault::RateLimited | Fault::Unreachable));
        match fault {
            Some(Fault::RateLimited) => Err(RpcManagerError::RateLimitExceeded {
                endpoint: self.endpoint(),
            }),
            Some(_) => Err(RpcManagerError::Transport {
                endpoint: self.endpoint(),
                message: "connection refused".to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Verify, execute and record a transaction. Program failures land as
    /// failed transactions; only envelope problems are returned as errors.
    fn process_transaction(&self, tx: &VersionedTransaction) -> Result<Signature, RpcManagerError> {
        let signature = *tx
            .signatures
            .first()
            .ok_or_else(|| RpcManagerError::Decode("transaction has no signatures".to_string()))?;
        if tx.verify_with_results().iter().any(|ok| !ok) {
            return Err(RpcManagerError::RpcResponse {
                endpoint: self.endpoint(),
                message: "Transaction signature verification failure".to_string(),
                code: Some(-32003),
            });
        }

        let mut state = self.state.lock();
        if !state.blockhash_valid(tx.message.recent_blockhash()) {
            return Err(RpcManagerError::BlockhashNotFound {
                endpoint: self.endpoint(),
            });
        }
        if state.transactions.contains_key(&signature) {
            return Err(RpcManagerError::RpcResponse {
                endpoint: self.endpoint(),
                message: "This transaction has already been processed".to_string(),
                code: Some(-32002),
            });
        }
        if state.take_fault(|f| f == Fault::DropTransaction).is_some() {
            warn!(signature = %signature, "Dropping transaction");
            return Ok(signature);
        }

        let current = Scratch {
            balances: state.balances.clone(),
            game: state.game.map(|g| g.account),
            game_mutations: 0,
        };
        let execution = runtime::execute(&self.program_id, &self.config, &current, tx, state.clock);

        state.produce_block();
        let error = match execution.result {
            Ok(scratch) => {
                state.balances = scratch.balances;
                if let Some(account) = scratch.game {
                    let version = state.game.map_or(0, |g| g.version) + scratch.game_mutations;
                    state.game = Some(VersionedGame { version, account });
                }
                None
            }
            Err(e) => {
                debug!(signature = %signature, error = %e, "Transaction failed");
                Some(e)
            }
        };

        let record = TransactionRecord {
            signature,
            slot: state.slot,
            block_time: Some(state.clock),
            logs: execution.logs,
            memos: execution.memos,
            failed: error.is_some(),
        };
        let notification = LogNotification {
            signature,
            slot: record.slot,
            logs: record.logs.clone(),
            failed: record.failed,
        };
        state.transactions.insert(
            signature,
            Landed {
                record,
                error,
                account_keys: tx.message.static_account_keys().to_vec(),
            },
        );
        state.order.push(signature);
        drop(state);

        // No subscribers is fine
        let _ = self.notifications.send(notification);
        Ok(signature)
    }
}

#[async_trait]
impl ChainClient for LocalLedger {
    fn endpoint(&self) -> String {
        "local".to_string()
    }

    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountSnapshot, RpcManagerError> {
        self.read_fault()?;
        let state = self.state.lock();
        let data = if *address == self.game_address {
            state.game.map(|g| g.account.encode())
        } else {
            state.balances.get(address).map(|_| Vec::new())
        };
        Ok(AccountSnapshot {
            slot: state.slot,
            data,
        })
    }

    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcManagerError> {
        self.read_fault()?;
        let state = self.state.lock();
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|sig| state.transactions.get(sig))
            .filter(|landed| landed.account_keys.contains(address))
            .take(limit)
            .map(|landed| SignatureInfo {
                signature: landed.record.signature,
                slot: landed.record.slot,
                block_time: landed.record.block_time,
                failed: landed.record.failed,
            })
            .collect())
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcManagerError> {
        self.read_fault()?;
        Ok(self
            .state
            .lock()
            .transactions
            .get(signature)
            .map(|landed| landed.record.clone()))
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), RpcManagerError> {
        let state = self.state.lock();
        let produced = state
            .blockhashes
            .get(&state.latest_blockhash)
            .copied()
            .unwrap_or(state.block_height);
        Ok((state.latest_blockhash, produced + BLOCKHASH_VALIDITY_BLOCKS))
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        Ok(self.state.lock().block_height)
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, RpcManagerError> {
        self.process_transaction(tx)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcManagerError> {
        Ok(self
            .state
            .lock()
            .transactions
            .get(signature)
            .map(|landed| match &landed.error {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }))
    }
}

#[async_trait]
impl EventStream for LocalLedger {
    async fn subscribe(
        &self,
        program_id: &Pubkey,
        tx: mpsc::UnboundedSender<LogNotification>,
    ) -> Result<(), RpcManagerError> {
        if *program_id != self.program_id {
            return Err(RpcManagerError::Subscription(format!(
                "ledger does not host program {}",
                program_id
            )));
        }
        let mut rx = self.notifications.subscribe();
        info!(program_id = %program_id, "Local log subscription started");

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        if tx.send(notification).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Log subscriber lagged, notifications lost");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}

//! Ledger access capability
//!
//! Everything the client needs from a cluster, behind one trait so the
//! reconciler and the submitter run unchanged against a real RPC endpoint
//! ([`SolanaRpcClient`]) or the in-process [`LocalLedger`](crate::ledger::LocalLedger).

use async_trait::async_trait;
use solana_sdk::{
    hash::Hash, pubkey::Pubkey, signature::Signature, transaction::TransactionError,
    transaction::VersionedTransaction,
};

pub mod rpc_client;
pub mod rpc_errors;

pub use rpc_client::SolanaRpcClient;
pub use rpc_errors::{with_retry, RetryPolicy, RpcManagerError};

use crate::event::{memo_program_id, BidMessage, GameEvent, ThroneUsurped};

/// Result of an account fetch, tagged with the slot it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub slot: u64,
    /// `None` when the account does not exist
    pub data: Option<Vec<u8>>,
}

/// One entry of a signatures-for-address listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
}

/// A landed transaction reduced to what the history needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub signature: Signature,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub logs: Vec<String>,
    /// Data of every memo instruction, in order
    pub memos: Vec<Vec<u8>>,
    pub failed: bool,
}

impl TransactionRecord {
    /// Collect memo instruction payloads from a decoded transaction
    pub fn memo_payloads(tx: &VersionedTransaction) -> Vec<Vec<u8>> {
        let memo_program = memo_program_id();
        let keys = tx.message.static_account_keys();
        tx.message
            .instructions()
            .iter()
            .filter(|ix| keys.get(ix.program_id_index as usize) == Some(&memo_program))
            .map(|ix| ix.data.clone())
            .collect()
    }

    /// First tagged, valid message riding in this transaction
    pub fn message(&self) -> Option<BidMessage> {
        self.memos.iter().find_map(|data| BidMessage::from_memo_data(data))
    }

    /// Zero or one history entry. Failed transactions never produce one.
    pub fn game_event(&self) -> Option<GameEvent> {
        if self.failed {
            return None;
        }
        let event = ThroneUsurped::from_logs(&self.logs)?;
        Some(
            GameEvent::new(self.signature, event)
                .with_message(self.message())
                .with_slot(Some(self.slot)),
        )
    }
}

/// Push notification for a transaction mentioning the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNotification {
    pub signature: Signature,
    pub slot: u64,
    pub logs: Vec<String>,
    pub failed: bool,
}

impl LogNotification {
    pub fn game_event(&self) -> Option<GameEvent> {
        if self.failed {
            return None;
        }
        let event = ThroneUsurped::from_logs(&self.logs)?;
        Some(GameEvent::new(self.signature, event).with_slot(Some(self.slot)))
    }
}

/// Cluster read/submit capability
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Endpoint identifier for logs and advisories
    fn endpoint(&self) -> String;

    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountSnapshot, RpcManagerError>;

    /// Most recent signatures touching `address`, newest first
    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcManagerError>;

    /// `None` when the transaction is unknown (not yet indexed or pruned)
    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcManagerError>;

    /// Latest blockhash and the last block height it is valid for
    async fn latest_blockhash(&self) -> Result<(Hash, u64), RpcManagerError>;

    async fn block_height(&self) -> Result<u64, RpcManagerError>;

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, RpcManagerError>;

    /// `None` while unknown, `Some(Ok)` once landed successfully,
    /// `Some(Err)` if it landed and failed
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcManagerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        message::{Message, VersionedMessage},
        signature::Keypair,
        signer::Signer,
    };

    #[test]
    fn test_memo_payloads_extracted_in_order() {
        let payer = Keypair::new();
        let first = BidMessage::new("first").unwrap();
        let second = BidMessage::new("second").unwrap();
        let message = Message::new(
            &[first.instruction(), second.instruction()],
            Some(&payer.pubkey()),
        );
        let tx = VersionedTransaction::try_new(VersionedMessage::Legacy(message), &[&payer]).unwrap();

        let memos = TransactionRecord::memo_payloads(&tx);
        assert_eq!(memos, vec![first.memo_data(), second.memo_data()]);
    }

    #[test]
    fn test_failed_transaction_has_no_event() {
        let event = ThroneUsurped {
            new_holder: Pubkey::new_unique(),
            previous_holder: Pubkey::new_unique(),
            price: 1,
            timestamp: 2,
        };
        let mut record = TransactionRecord {
            signature: Signature::new_unique(),
            slot: 9,
            block_time: Some(2),
            logs: vec![event.to_log_line()],
            memos: vec![b"untagged".to_vec(), BidMessage::new("hi").unwrap().memo_data()],
            failed: false,
        };
        let entry = record.game_event().unwrap();
        assert_eq!(entry.message.unwrap().as_str(), "hi");
        assert_eq!(entry.slot, Some(9));

        record.failed = true;
        assert!(record.game_event().is_none());
    }
}

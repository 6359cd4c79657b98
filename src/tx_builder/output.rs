//! Signed transaction ready for broadcast

use super::instructions::GameAction;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

#[derive(Debug, Clone)]
pub struct TxBuildOutput {
    pub tx: VersionedTransaction,
    pub action: GameAction,
    /// Expiry reference copied from the execution context
    pub last_valid_block_height: u64,
    /// Extracted from `message.header.num_required_signatures`
    pub required_signers: Vec<Pubkey>,
}

impl TxBuildOutput {
    pub fn new(tx: VersionedTransaction, action: GameAction, last_valid_block_height: u64) -> Self {
        let signer_count = tx.message.header().num_required_signatures as usize;
        let required_signers = tx
            .message
            .static_account_keys()
            .iter()
            .take(signer_count)
            .copied()
            .collect();
        Self {
            tx,
            action,
            last_valid_block_height,
            required_signers,
        }
    }

    /// Transaction id: the fee payer's signature
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn required_signers(&self) -> &[Pubkey] {
        &self.required_signers
    }
}

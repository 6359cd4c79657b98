//! Transaction assembly and signing
//!
//! Signing goes through [`TransactionSigner`], which may suspend for as long
//! as a wallet takes to approve. A signer that refuses reports
//! [`SignerError::Declined`], which surfaces as
//! [`SubmissionError::UserDeclined`].

use super::context::ExecutionContext;
use super::errors::SubmissionError;
use super::instructions::{plan_instructions, GameAction};
use super::output::TxBuildOutput;
use crate::event::BidMessage;
use async_trait::async_trait;
use solana_sdk::{
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("declined by signer")]
    Declined,

    #[error("{0}")]
    Failed(String),
}

/// Something that can approve and sign a message as the fee payer
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn sign_message(&self, message: &VersionedMessage) -> Result<Signature, SignerError>;
}

pub struct TxBuilder {
    program_id: Pubkey,
    signer: Arc<dyn TransactionSigner>,
}

impl TxBuilder {
    pub fn new(program_id: Pubkey, signer: Arc<dyn TransactionSigner>) -> Self {
        Self { program_id, signer }
    }

    pub fn payer(&self) -> Pubkey {
        self.signer.pubkey()
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Plan, compile and sign `action` against `context`
    pub async fn build(
        &self,
        action: GameAction,
        message: Option<BidMessage>,
        context: &ExecutionContext,
    ) -> Result<TxBuildOutput, SubmissionError> {
        let payer = self.signer.pubkey();
        let plan = plan_instructions(&self.program_id, &payer, action, message)?;
        let compiled = VersionedMessage::Legacy(Message::new_with_blockhash(
            &plan.instructions,
            Some(&payer),
            &context.blockhash,
        ));

        debug!(
            action = action.name(),
            correlation_id = %context.trace_context.correlation_id(),
            "Requesting signature"
        );
        let signature = self
            .signer
            .sign_message(&compiled)
            .await
            .map_err(|e| match e {
                SignerError::Declined => SubmissionError::UserDeclined,
                SignerError::Failed(reason) => SubmissionError::Signing(reason),
            })?;

        let tx = VersionedTransaction {
            signatures: vec![signature],
            message: compiled,
        };
        Ok(TxBuildOutput::new(
            tx,
            action,
            context.last_valid_block_height,
        ))
    }
}

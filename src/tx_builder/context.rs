//! Execution context for transaction building
//!
//! Holds the blockhash a transaction is built against and the last block
//! height at which that blockhash is still accepted. The height is the
//! expiry reference the confirmation loop compares against.

use super::errors::SubmissionError;
use crate::observability::TraceContext;
use crate::rpc::{with_retry, ChainClient, RetryPolicy};
use solana_sdk::hash::Hash;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    pub trace_context: TraceContext,
}

impl ExecutionContext {
    /// Fetch a fresh blockhash, retrying transient failures
    pub async fn prepare(
        client: &dyn ChainClient,
        trace_context: TraceContext,
    ) -> Result<Self, SubmissionError> {
        let (blockhash, last_valid_block_height) =
            with_retry(&RetryPolicy::default(), || client.latest_blockhash()).await?;
        Ok(Self {
            blockhash,
            last_valid_block_height,
            trace_context,
        })
    }

    /// Whether the blockhash can no longer land at `block_height`
    pub fn is_expired_at(&self, block_height: u64) -> bool {
        block_height > self.last_valid_block_height
    }
}

//! `ChainClient` over a Solana JSON-RPC endpoint
//!
//! Outbound calls are throttled client-side to `rate_limit_rps` so a burst
//! of history fetches does not trip the provider's own limiter.

use super::{AccountSnapshot, ChainClient, RpcManagerError, SignatureInfo, TransactionRecord};
use crate::metrics::Timer;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::TransactionError, transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct SolanaRpcClient {
    url: String,
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for SolanaRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpcClient")
            .field("url", &self.url)
            .field("commitment", &self.commitment)
            .finish_non_exhaustive()
    }
}

impl SolanaRpcClient {
    pub fn new(
        url: impl Into<String>,
        commitment: CommitmentConfig,
        timeout: Duration,
        rate_limit_rps: u32,
    ) -> Self {
        let url = url.into();
        let rps = NonZeroU32::new(rate_limit_rps).unwrap_or(NonZeroU32::MIN);
        Self {
            client: Arc::new(RpcClient::new_with_timeout_and_commitment(
                url.clone(),
                timeout,
                commitment,
            )),
            url,
            commitment,
            limiter: RateLimiter::direct(Quota::per_second(rps)),
        }
    }

    async fn throttle(&self) {
        self.limiter.until_ready().await;
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.url)
    }
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    fn endpoint(&self) -> String {
        self.url.clone()
    }

    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch_account(&self, address: &Pubkey) -> Result<AccountSnapshot, RpcManagerError> {
        self.throttle().await;
        let timer = Timer::with_name("rpc_latency_seconds");
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        timer.finish();

        Ok(AccountSnapshot {
            slot: response.context.slot,
            data: response.value.map(|account| account.data),
        })
    }

    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, RpcManagerError> {
        self.throttle().await;
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let statuses = self
            .client
            .get_signatures_for_address_with_config(address, config)
            .await
            .map_err(|e| self.map_err(e))?;

        statuses
            .into_iter()
            .map(|status| {
                let signature = Signature::from_str(&status.signature)
                    .map_err(|e| RpcManagerError::Decode(format!("bad signature: {}", e)))?;
                Ok(SignatureInfo {
                    signature,
                    slot: status.slot,
                    block_time: status.block_time,
                    failed: status.err.is_some(),
                })
            })
            .collect()
    }

    async fn fetch_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, RpcManagerError> {
        self.throttle().await;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let encoded = match self
            .client
            .get_transaction_with_config(signature, config)
            .await
        {
            Ok(tx) => tx,
            // The node answers `null` for transactions it does not know
            Err(e) if e.to_string().contains("invalid type: null") => {
                debug!(signature = %signature, "Transaction not found");
                return Ok(None);
            }
            Err(e) => return Err(self.map_err(e)),
        };

        let (logs, failed) = match encoded.transaction.meta {
            Some(meta) => (
                Option::<Vec<String>>::from(meta.log_messages).unwrap_or_default(),
                meta.err.is_some(),
            ),
            None => (vec![], false),
        };
        let memos = encoded
            .transaction
            .transaction
            .decode()
            .map(|tx| TransactionRecord::memo_payloads(&tx))
            .unwrap_or_default();

        Ok(Some(TransactionRecord {
            signature: *signature,
            slot: encoded.slot,
            block_time: encoded.block_time,
            logs,
            memos,
            failed,
        }))
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), RpcManagerError> {
        self.throttle().await;
        self.client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        self.throttle().await;
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, RpcManagerError> {
        self.throttle().await;
        self.client
            .send_transaction(tx)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), TransactionError>>, RpcManagerError> {
        self.throttle().await;
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;

        let status = response.value.into_iter().next().flatten();
        Ok(status.and_then(|status| match status.err {
            Some(err) => Some(Err(err)),
            None if status.satisfies_commitment(self.commitment) => Some(Ok(())),
            None => None,
        }))
    }
}

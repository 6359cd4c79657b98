//! WebSocket log subscription over the native Solana pubsub API

use super::EventStream;
use crate::rpc::{LogNotification, RpcManagerError};
use async_trait::async_trait;
use futures_util::StreamExt;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Streams `logsSubscribe` notifications for a program
pub struct WebSocketEventStream {
    ws_url: String,
    commitment: CommitmentConfig,
}

impl WebSocketEventStream {
    pub fn new(ws_url: impl Into<String>, commitment: CommitmentConfig) -> Self {
        Self {
            ws_url: ws_url.into(),
            commitment,
        }
    }

    async fn connect(&self) -> Result<Arc<PubsubClient>, RpcManagerError> {
        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| RpcManagerError::classify(&e.to_string(), &self.ws_url))?;
        info!(url = %self.ws_url, "Pubsub connected");
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl EventStream for WebSocketEventStream {
    async fn subscribe(
        &self,
        program_id: &Pubkey,
        tx: mpsc::UnboundedSender<LogNotification>,
    ) -> Result<(), RpcManagerError> {
        let client = self.connect().await?;
        let commitment = self.commitment;
        let program_id = *program_id;
        let (ready_tx, ready_rx) = oneshot::channel();

        // The notification stream borrows the client, so both live in the task
        tokio::spawn(async move {
            let (mut notifications, unsubscribe) = match client
                .logs_subscribe(
                    RpcTransactionLogsFilter::Mentions(vec![program_id.to_string()]),
                    RpcTransactionLogsConfig {
                        commitment: Some(commitment),
                    },
                )
                .await
            {
                Ok(result) => {
                    let _ = ready_tx.send(Ok(()));
                    result
                }
                Err(e) => {
                    error!(program_id = %program_id, error = %e, "logsSubscribe refused");
                    let _ = ready_tx.send(Err(RpcManagerError::Subscription(e.to_string())));
                    return;
                }
            };

            while let Some(response) = notifications.next().await {
                let Ok(signature) = Signature::from_str(&response.value.signature) else {
                    debug!(raw = %response.value.signature, "Dropping notification, bad signature");
                    continue;
                };
                let notification = LogNotification {
                    signature,
                    slot: response.context.slot,
                    logs: response.value.logs,
                    failed: response.value.err.is_some(),
                };
                if tx.send(notification).is_err() {
                    warn!(program_id = %program_id, "Reconciler gone, unsubscribing");
                    break;
                }
            }
            unsubscribe().await;
        });

        ready_rx
            .await
            .map_err(|_| RpcManagerError::Subscription("subscription task ended".to_string()))?
    }
}

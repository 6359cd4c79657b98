//! Push sources for program activity
//!
//! The reconciler works from polling alone; a stream only lets it learn
//! about bids sooner. Notifications carry the raw transaction logs so the
//! same event decoder serves both paths.

#[cfg(feature = "ws-stream")]
pub mod websocket_stream;

#[cfg(feature = "ws-stream")]
pub use websocket_stream::WebSocketEventStream;

use crate::rpc::{LogNotification, RpcManagerError};
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::mpsc;

/// Subscription to transactions mentioning a program
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Start forwarding notifications for `program_id` into `tx`.
    ///
    /// Returns once the subscription is established. Forwarding stops when
    /// the receiver is dropped or the source closes, at which point the
    /// sender is dropped and the receiver observes end-of-stream.
    async fn subscribe(
        &self,
        program_id: &Pubkey,
        tx: mpsc::UnboundedSender<LogNotification>,
    ) -> Result<(), RpcManagerError>;
}

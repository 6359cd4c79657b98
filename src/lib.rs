//! Throne - last-bidder-wins auction on Solana
//!
//! The crate holds both sides of the game:
//!
//! - **program**: the on-chain state machine (initialize, usurp, claim)
//! - **ledger**: an in-process ledger that runs the program with atomic
//!   commits, blockhash expiry and log notifications
//! - **reconciler**: polling plus push subscription merged into one
//!   deduplicated, rate-limit aware view of the game
//! - **tx_builder**: non-blocking submission with optimistic message state

pub mod account;
pub mod config;
pub mod constants;
pub mod event;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod optimistic;
pub mod program;
pub mod reconciler;
pub mod rpc;
pub mod streaming;
pub mod structured_logging;
pub mod tx_builder;
pub mod wallet;

// Re-export commonly used types
pub use account::{GameAccount, VersionedGame};
pub use config::Config;
pub use event::{BidMessage, GameEvent, ThroneUsurped};
pub use ledger::{Fault, LocalLedger};
pub use optimistic::Optimistic;
pub use program::{ClaimPolicy, GameError, ProgramConfig};
pub use reconciler::{Advisory, ChainSnapshot, GameView, Reconciler, ReconcilerConfig};
pub use rpc::{ChainClient, RpcManagerError};
pub use tx_builder::{GameAction, SubmissionError, SubmissionStatus, Submitter, TxBuilder};
pub use wallet::WalletManager;

pub use solana_sdk::{pubkey::Pubkey, signature::Signature};

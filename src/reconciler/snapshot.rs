//! What the reconciler publishes to renderers

use crate::account::GameAccount;
use crate::event::GameEvent;
use std::fmt;
use std::time::Duration;

/// Local belief about the game account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameView {
    /// Nothing fetched yet
    #[default]
    Unknown,
    /// The account does not exist: the game was never initialized
    Uninitialized,
    Active {
        account: GameAccount,
        /// Context slot the account was read at
        slot: u64,
    },
}

impl GameView {
    pub fn label(&self) -> &'static str {
        match self {
            GameView::Unknown => "unknown",
            GameView::Uninitialized => "uninitialized",
            GameView::Active { .. } => "active",
        }
    }

    pub fn account(&self) -> Option<&GameAccount> {
        match self {
            GameView::Active { account, .. } => Some(account),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<u64> {
        match self {
            GameView::Active { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

/// Standing, non-fatal condition of the read path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    Unreachable { endpoint: String },
    RateLimited { retry_in: Duration },
    /// Transport failures have persisted across several polls
    Degraded { consecutive_failures: u32 },
    ReadError { message: String },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::Unreachable { endpoint } => write!(f, "network unreachable ({})", endpoint),
            Advisory::RateLimited { retry_in } => {
                write!(f, "rate limited, cooldown active for {}s", retry_in.as_secs())
            }
            Advisory::Degraded {
                consecutive_failures,
            } => write!(f, "connection degraded after {} failed polls", consecutive_failures),
            Advisory::ReadError { message } => write!(f, "read failed: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainSnapshot {
    pub view: GameView,
    /// Newest first, deduplicated by signature
    pub history: Vec<GameEvent>,
    pub advisory: Option<Advisory>,
}

//! Game account model
//!
//! The game lives in exactly one account whose address is derived from the
//! constant seed [`GAME_SEED`](crate::constants::GAME_SEED) under the program
//! id. Its data layout is Anchor-compatible:
//!
//! | offset | size | field             |
//! |--------|------|-------------------|
//! | 0      | 8    | discriminator     |
//! | 8      | 32   | `title_holder`    |
//! | 40     | 8    | `price` (LE)      |
//! | 48     | 8    | `deadline` (LE)   |
//! | 56     | 8    | `jackpot` (LE)    |
//! | 64     | 32   | `fee_beneficiary` |

use crate::constants::GAME_SEED;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Serialized size of a game account, discriminator included
pub const GAME_ACCOUNT_LEN: usize = 8 + 32 + 8 + 8 + 8 + 32;

/// Compute an Anchor-style 8-byte discriminator: `sha256("<namespace>:<name>")[..8]`
pub fn discriminator(namespace: &str, name: &str) -> [u8; 8] {
    let digest = Sha256::digest(format!("{}:{}", namespace, name).as_bytes());
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Derive the game account address and its bump
pub fn game_address(program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[GAME_SEED], program_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountDecodeError {
    #[error("account data too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("account discriminator mismatch")]
    WrongDiscriminator,
}

/// Durable game state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAccount {
    /// Identity currently entitled to the jackpot
    pub title_holder: Pubkey,
    /// Last price paid, in lamports
    pub price: u64,
    /// Unix timestamp (seconds) after which bidding closes
    pub deadline: i64,
    /// Lamports accumulated for the last holder standing
    pub jackpot: u64,
    /// Fixed at initialization; every bid must cite it
    pub fee_beneficiary: Pubkey,
}

impl GameAccount {
    pub fn discriminator() -> [u8; 8] {
        discriminator("account", "GameState")
    }

    /// Whether bidding is closed at `now`
    pub fn round_over(&self, now: i64) -> bool {
        now >= self.deadline
    }

    /// Seconds left in the round, zero once it is over
    pub fn seconds_remaining(&self, now: i64) -> i64 {
        self.deadline.saturating_sub(now).max(0)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(GAME_ACCOUNT_LEN);
        data.extend_from_slice(&Self::discriminator());
        data.extend_from_slice(self.title_holder.as_ref());
        data.extend_from_slice(&self.price.to_le_bytes());
        data.extend_from_slice(&self.deadline.to_le_bytes());
        data.extend_from_slice(&self.jackpot.to_le_bytes());
        data.extend_from_slice(self.fee_beneficiary.as_ref());
        data
    }

    pub fn decode(data: &[u8]) -> Result<Self, AccountDecodeError> {
        if data.len() < GAME_ACCOUNT_LEN {
            return Err(AccountDecodeError::TooShort {
                expected: GAME_ACCOUNT_LEN,
                actual: data.len(),
            });
        }
        if data[..8] != Self::discriminator() {
            return Err(AccountDecodeError::WrongDiscriminator);
        }

        let pubkey_at = |offset: usize| {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&data[offset..offset + 32]);
            Pubkey::new_from_array(bytes)
        };
        let word_at = |offset: usize| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&data[offset..offset + 8]);
            bytes
        };

        Ok(Self {
            title_holder: pubkey_at(8),
            price: u64::from_le_bytes(word_at(40)),
            deadline: i64::from_le_bytes(word_at(48)),
            jackpot: u64::from_le_bytes(word_at(56)),
            fee_beneficiary: pubkey_at(64),
        })
    }
}

/// A game record together with the number of committed mutations it has seen.
///
/// The version increases on every successful state transition; observers can
/// compare versions instead of field-by-field equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionedGame {
    pub version: u64,
    pub account: GameAccount,
}

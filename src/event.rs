//! Event projection of successful bids
//!
//! Every successful `usurp_throne` emits one [`ThroneUsurped`] record as an
//! Anchor-style `Program data:` log line. A bidder may attach a
//! [`BidMessage`] to the same transaction through a tagged memo instruction;
//! the two are correlated only by sharing a transaction id.

use crate::account::discriminator;
use crate::constants::{MAX_MESSAGE_LEN, MEMO_PROGRAM_ID, MESSAGE_TAG, PROGRAM_DATA_PREFIX};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, signature::Signature};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const EVENT_LEN: usize = 8 + 32 + 32 + 8 + 8;

/// Notification emitted on every successful bid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroneUsurped {
    pub new_holder: Pubkey,
    pub previous_holder: Pubkey,
    /// Price paid by the new holder
    pub price: u64,
    pub timestamp: i64,
}

impl ThroneUsurped {
    /// Keyed on the event name the deployed program emits
    pub fn discriminator() -> [u8; 8] {
        discriminator("event", "NewKingEvent")
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(EVENT_LEN);
        data.extend_from_slice(&Self::discriminator());
        data.extend_from_slice(self.new_holder.as_ref());
        data.extend_from_slice(self.previous_holder.as_ref());
        data.extend_from_slice(&self.price.to_le_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data
    }

    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < EVENT_LEN || data[..8] != Self::discriminator() {
            return None;
        }
        let new_holder = Pubkey::try_from(&data[8..40]).ok()?;
        let previous_holder = Pubkey::try_from(&data[40..72]).ok()?;
        let price = u64::from_le_bytes(data[72..80].try_into().ok()?);
        let timestamp = i64::from_le_bytes(data[80..88].try_into().ok()?);
        Some(Self {
            new_holder,
            previous_holder,
            price,
            timestamp,
        })
    }

    pub fn to_log_line(&self) -> String {
        format!("{}{}", PROGRAM_DATA_PREFIX, BASE64.encode(self.encode()))
    }

    pub fn from_log_line(line: &str) -> Option<Self> {
        let payload = line.strip_prefix(PROGRAM_DATA_PREFIX)?;
        let bytes = BASE64.decode(payload.trim()).ok()?;
        Self::decode(&bytes)
    }

    /// First event found in a transaction's log output
    pub fn from_logs<S: AsRef<str>>(logs: &[S]) -> Option<Self> {
        logs.iter().find_map(|line| Self::from_log_line(line.as_ref()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("message is empty")]
    Empty,

    #[error("message is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("message contains control characters")]
    ControlCharacters,
}

/// Free-text annotation attached to a bid, validated on construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BidMessage(String);

impl BidMessage {
    pub fn new(text: impl AsRef<str>) -> Result<Self, MessageError> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(MessageError::Empty);
        }
        let len = text.chars().count();
        if len > MAX_MESSAGE_LEN {
            return Err(MessageError::TooLong {
                len,
                max: MAX_MESSAGE_LEN,
            });
        }
        if text.chars().any(char::is_control) {
            return Err(MessageError::ControlCharacters);
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Memo payload: tag followed by the UTF-8 text
    pub fn memo_data(&self) -> Vec<u8> {
        format!("{}{}", MESSAGE_TAG, self.0).into_bytes()
    }

    /// Recover a message from memo instruction data. Untagged or invalid
    /// payloads are not messages.
    pub fn from_memo_data(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        let body = text.strip_prefix(MESSAGE_TAG)?;
        Self::new(body).ok()
    }

    pub fn instruction(&self) -> Instruction {
        Instruction {
            program_id: memo_program_id(),
            accounts: vec![],
            data: self.memo_data(),
        }
    }
}

impl TryFrom<String> for BidMessage {
    type Error = MessageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BidMessage> for String {
    fn from(value: BidMessage) -> Self {
        value.0
    }
}

impl fmt::Display for BidMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn memo_program_id() -> Pubkey {
    Pubkey::from_str(MEMO_PROGRAM_ID).unwrap_or_default()
}

/// One history entry: an event plus the transaction it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Submitting transaction, unique per event
    pub signature: Signature,
    pub new_holder: Pubkey,
    pub previous_holder: Pubkey,
    pub price: u64,
    pub timestamp: i64,
    pub message: Option<BidMessage>,
    /// Slot the transaction landed in, when known
    pub slot: Option<u64>,
}

impl GameEvent {
    pub fn new(signature: Signature, event: ThroneUsurped) -> Self {
        Self {
            signature,
            new_holder: event.new_holder,
            previous_holder: event.previous_holder,
            price: event.price,
            timestamp: event.timestamp,
            message: None,
            slot: None,
        }
    }

    pub fn with_message(mut self, message: Option<BidMessage>) -> Self {
        self.message = message;
        self
    }

    pub fn with_slot(mut self, slot: Option<u64>) -> Self {
        self.slot = slot;
        self
    }
}

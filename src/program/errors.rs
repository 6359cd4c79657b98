//! Contract rejections raised by the auction program
//!
//! Every variant maps to one precondition of an instruction. A rejected
//! instruction never leaves a partial mutation behind: the host ledger
//! discards the whole transaction.

use crate::constants::ERROR_CODE_OFFSET;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GameError {
    #[error("The round has ended")]
    RoundEnded,

    #[error("The round is not over yet")]
    RoundNotOver,

    #[error("Caller is not the current title holder")]
    NotTheHolder,

    #[error("Security alert: fee beneficiary does not match the one fixed at initialization")]
    WrongFeeBeneficiary,

    #[error("Game account already initialized")]
    AlreadyInitialized,

    #[error("Stale challenge: cited previous holder is no longer the title holder")]
    StaleChallenge,

    #[error("Game account not initialized")]
    NotInitialized,

    #[error("Insufficient funds to cover the bid")]
    InsufficientFunds,

    #[error("Required signature missing")]
    MissingSigner,

    #[error("Invalid instruction data or accounts")]
    InvalidInstruction,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("Game account address does not match the derived address")]
    InvalidGameAddress,
}

/// Broad family of a rejection, used by callers to decide what to surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Attempt to redirect fees
    Security,
    /// Deadline-related gating
    Timing,
    /// Lost a bid race or acting on stale state; refetch and retry
    Race,
    /// One-time setup problems
    Setup,
    /// Malformed transaction or insufficient balance
    Malformed,
}

const ALL: [GameError; 12] = [
    GameError::RoundEnded,
    GameError::RoundNotOver,
    GameError::NotTheHolder,
    GameError::WrongFeeBeneficiary,
    GameError::AlreadyInitialized,
    GameError::StaleChallenge,
    GameError::NotInitialized,
    GameError::InsufficientFunds,
    GameError::MissingSigner,
    GameError::InvalidInstruction,
    GameError::ArithmeticOverflow,
    GameError::InvalidGameAddress,
];

impl GameError {
    /// Custom program error code as it appears on the wire
    pub fn code(&self) -> u32 {
        let index = ALL.iter().position(|e| e == self).unwrap_or(0);
        ERROR_CODE_OFFSET + index as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        let index = code.checked_sub(ERROR_CODE_OFFSET)? as usize;
        ALL.get(index).copied()
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::WrongFeeBeneficiary | Self::InvalidGameAddress => ErrorClass::Security,
            Self::RoundEnded | Self::RoundNotOver => ErrorClass::Timing,
            Self::StaleChallenge | Self::NotTheHolder => ErrorClass::Race,
            Self::AlreadyInitialized | Self::NotInitialized => ErrorClass::Setup,
            Self::InsufficientFunds
            | Self::MissingSigner
            | Self::InvalidInstruction
            | Self::ArithmeticOverflow => ErrorClass::Malformed,
        }
    }
}

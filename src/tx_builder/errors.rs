//! Submission error taxonomy
//!
//! Callers distinguish four outcomes of a failed submission:
//! - `UserDeclined`: the signer refused; nothing to report to the user
//! - `Expired`: the blockhash window closed before the transaction landed,
//!   resubmitting with a fresh blockhash may succeed
//! - `Rejected`: the ledger or the program refused it, with the decoded
//!   program error when there is one
//! - everything else: transport or local build problems

use crate::program::GameError;
use crate::rpc::RpcManagerError;
use solana_sdk::{instruction::InstructionError, transaction::TransactionError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SubmissionError {
    #[error("Signer declined the transaction")]
    UserDeclined,

    #[error("Transaction expired: block height passed {last_valid_block_height}")]
    Expired { last_valid_block_height: u64 },

    #[error("Transaction rejected: {message}")]
    Rejected {
        program_error: Option<GameError>,
        message: String,
    },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Instruction build error (action={action}): {reason}")]
    InstructionBuild { action: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SubmissionError {
    /// Whether resubmitting the same action might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Expired { .. } => true,
            Self::Rpc(e) => e.is_retryable(),
            // A stale view is fixed by refetching and bidding again
            Self::Rejected {
                program_error: Some(GameError::StaleChallenge),
                ..
            } => true,

            Self::UserDeclined => false,
            Self::Rejected { .. } => false,
            Self::Signing(_) => false,
            Self::InstructionBuild { .. } => false,
            Self::Configuration(_) => false,
            Self::Internal(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::UserDeclined => "declined",
            Self::Expired { .. } => "expired",
            Self::Rejected { .. } => "rejected",
            Self::Rpc(_) => "rpc",
            Self::Signing(_) => "signing",
            Self::InstructionBuild { .. } => "instruction",
            Self::Configuration(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Declines are swallowed; every other failure reaches the user
    pub fn should_surface(&self) -> bool {
        !matches!(self, Self::UserDeclined)
    }

    pub fn program_error(&self) -> Option<GameError> {
        match self {
            Self::Rejected { program_error, .. } => *program_error,
            _ => None,
        }
    }

    pub fn instruction_failed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Rejection from a landed transaction's error
    pub fn from_transaction_error(err: &TransactionError) -> Self {
        let program_error = match err {
            TransactionError::InstructionError(_, InstructionError::Custom(code)) => {
                GameError::from_code(*code)
            }
            _ => None,
        };
        Self::Rejected {
            program_error,
            message: program_error.map_or_else(|| err.to_string(), |e| e.to_string()),
        }
    }

    /// Map a failed send. Preflight failures carry the program error in
    /// their message (`custom program error: 0x1775`).
    pub fn from_send_error(err: RpcManagerError, last_valid_block_height: u64) -> Self {
        match err {
            RpcManagerError::BlockhashNotFound { .. } | RpcManagerError::TransactionExpired { .. } => {
                Self::Expired {
                    last_valid_block_height,
                }
            }
            err @ RpcManagerError::InsufficientFunds { .. } => Self::Rejected {
                program_error: None,
                message: err.to_string(),
            },
            RpcManagerError::RpcResponse {
                endpoint,
                message,
                code,
            } => match parse_custom_code(&message) {
                Some(custom) => {
                    let program_error = GameError::from_code(custom);
                    Self::Rejected {
                        program_error,
                        message: program_error.map_or(message, |e| e.to_string()),
                    }
                }
                None if message.contains("simulation failed") => Self::Rejected {
                    program_error: None,
                    message,
                },
                None => Self::Rpc(RpcManagerError::RpcResponse {
                    endpoint,
                    message,
                    code,
                }),
            },
            other => Self::Rpc(other),
        }
    }
}

fn parse_custom_code(message: &str) -> Option<u32> {
    let hex = message.split("custom program error: 0x").nth(1)?;
    let digits: String = hex.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
    u32::from_str_radix(&digits, 16).ok()
}

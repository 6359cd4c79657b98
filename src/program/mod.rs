//! Auction program
//!
//! Three instructions operate on the single game account:
//! - **initialize**: create the record, fix the fee beneficiary
//! - **usurp_throne**: outbid the current holder, refunding them with a premium
//! - **claim_jackpot**: drain the jackpot once the round is over
//!
//! The transitions are pure functions over an explicitly passed record
//! ([`processor`]); atomicity and per-account serialization come from the
//! host ledger that applies them.

pub mod errors;
pub mod instruction;
pub mod math;
pub mod processor;

pub use errors::{ErrorClass, GameError};
pub use instruction::GameInstruction;
pub use math::BidQuote;
pub use processor::{ClaimPolicy, InstructionAccount, ProgramConfig, Transfer, Transition};

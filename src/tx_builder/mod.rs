//! Transaction builder and submitter
//!
//! - **errors**: submission outcome taxonomy
//! - **instructions**: action to instruction planning, memo placement
//! - **context**: blockhash and expiry reference
//! - **builder**: compile and sign through a [`TransactionSigner`]
//! - **output**: signed transaction ready for broadcast
//! - **submit**: non-blocking dispatch and confirmation tracking

pub mod errors;
pub use errors::SubmissionError;

mod builder;
mod context;
mod instructions;
mod output;
mod submit;

pub use builder::{SignerError, TransactionSigner, TxBuilder};
pub use context::ExecutionContext;
pub use instructions::{plan_instructions, sanity_check_ix_order, GameAction, InstructionPlan};
pub use output::TxBuildOutput;
pub use submit::{LatestMessage, PendingSubmission, SubmissionStatus, Submitter};

//! Instruction planning and ordering validation
//!
//! A transaction carries at most one program instruction followed by at
//! most one tagged memo. A message may ride with a bid or travel alone as a
//! broadcast; it never accompanies `initialize` or `claim_jackpot`.

use super::errors::SubmissionError;
use crate::account::GameAccount;
use crate::event::{memo_program_id, BidMessage};
use crate::program::instruction;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};

/// A state transition the client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameAction {
    Initialize { start_price: u64 },
    /// Bid against the holder and beneficiary the caller last observed
    Usurp {
        previous_holder: Pubkey,
        fee_beneficiary: Pubkey,
    },
    Claim,
    /// Message only, no state transition
    Broadcast,
}

impl GameAction {
    /// Bid against a mirrored account view
    pub fn usurp_from(view: &GameAccount) -> Self {
        Self::Usurp {
            previous_holder: view.title_holder,
            fee_beneficiary: view.fee_beneficiary,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::Usurp { .. } => "usurp_throne",
            Self::Claim => "claim_jackpot",
            Self::Broadcast => "broadcast",
        }
    }

    fn accepts_message(&self) -> bool {
        matches!(self, Self::Usurp { .. } | Self::Broadcast)
    }
}

#[derive(Debug, Clone)]
pub struct InstructionPlan {
    pub instructions: Vec<Instruction>,
    pub action: GameAction,
    pub message: Option<BidMessage>,
}

/// Build the instruction list for `action` signed by `payer`
pub fn plan_instructions(
    program_id: &Pubkey,
    payer: &Pubkey,
    action: GameAction,
    message: Option<BidMessage>,
) -> Result<InstructionPlan, SubmissionError> {
    if message.is_some() && !action.accepts_message() {
        return Err(SubmissionError::instruction_failed(
            action.name(),
            "a message can only accompany a bid or a broadcast",
        ));
    }

    let mut instructions = Vec::with_capacity(2);
    match action {
        GameAction::Initialize { start_price } => {
            if start_price == 0 {
                return Err(SubmissionError::instruction_failed(
                    action.name(),
                    "start price must be positive",
                ));
            }
            instructions.push(instruction::initialize(program_id, payer, start_price));
        }
        GameAction::Usurp {
            previous_holder,
            fee_beneficiary,
        } => instructions.push(instruction::usurp_throne(
            program_id,
            payer,
            &previous_holder,
            &fee_beneficiary,
        )),
        GameAction::Claim => instructions.push(instruction::claim_jackpot(program_id, payer)),
        GameAction::Broadcast => {
            if message.is_none() {
                return Err(SubmissionError::instruction_failed(
                    action.name(),
                    "a broadcast needs a message",
                ));
            }
        }
    }
    if let Some(message) = &message {
        instructions.push(message.instruction());
    }

    let plan = InstructionPlan {
        instructions,
        action,
        message,
    };
    sanity_check_ix_order(&plan, program_id)?;
    Ok(plan)
}

/// Program instruction first, memo last, one of each at most
pub fn sanity_check_ix_order(
    plan: &InstructionPlan,
    program_id: &Pubkey,
) -> Result<(), SubmissionError> {
    let memo = memo_program_id();
    let program_count = plan
        .instructions
        .iter()
        .filter(|ix| ix.program_id == *program_id)
        .count();
    let memo_positions: Vec<usize> = plan
        .instructions
        .iter()
        .enumerate()
        .filter(|(_, ix)| ix.program_id == memo)
        .map(|(i, _)| i)
        .collect();

    if plan.instructions.is_empty() {
        return Err(SubmissionError::instruction_failed(plan.action.name(), "empty plan"));
    }
    if program_count > 1 || memo_positions.len() > 1 {
        return Err(SubmissionError::instruction_failed(
            plan.action.name(),
            "at most one program instruction and one memo",
        ));
    }
    if let Some(&position) = memo_positions.first() {
        if position != plan.instructions.len() - 1 {
            return Err(SubmissionError::instruction_failed(
                plan.action.name(),
                "memo must be the last instruction",
            ));
        }
    }
    if program_count + memo_positions.len() != plan.instructions.len() {
        return Err(SubmissionError::instruction_failed(
            plan.action.name(),
            "unexpected program in plan",
        ));
    }
    Ok(())
}

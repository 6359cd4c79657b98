//! Transaction execution against a scratch copy of ledger state
//!
//! Instructions run in order on cloned balances and game record. The first
//! failing instruction aborts the transaction and the scratch copy is
//! discarded, so a failed transaction leaves no trace besides its logs.

use crate::account::GameAccount;
use crate::event::memo_program_id;
use crate::program::{processor, InstructionAccount, ProgramConfig, Transfer};
use solana_sdk::{
    instruction::InstructionError, pubkey::Pubkey, transaction::TransactionError,
    transaction::VersionedTransaction,
};
use std::collections::HashMap;

/// Mutable state a transaction may touch
#[derive(Debug, Clone, Default)]
pub(crate) struct Scratch {
    pub balances: HashMap<Pubkey, u64>,
    pub game: Option<GameAccount>,
    /// Number of successful program instructions applied
    pub game_mutations: u64,
}

#[derive(Debug)]
pub(crate) struct Execution {
    pub logs: Vec<String>,
    pub memos: Vec<Vec<u8>>,
    pub result: Result<Scratch, TransactionError>,
}

pub(crate) fn execute(
    program_id: &Pubkey,
    config: &ProgramConfig,
    state: &Scratch,
    tx: &VersionedTransaction,
    now: i64,
) -> Execution {
    let mut scratch = Scratch {
        game_mutations: 0,
        ..state.clone()
    };
    let mut logs = Vec::new();
    let mut memos = Vec::new();
    let memo_program = memo_program_id();
    let keys = tx.message.static_account_keys();
    let signer_count = tx.message.header().num_required_signatures as usize;

    for (index, ix) in tx.message.instructions().iter().enumerate() {
        let failed = |error: InstructionError| TransactionError::InstructionError(index as u8, error);
        let Some(program) = keys.get(ix.program_id_index as usize) else {
            return Execution {
                logs,
                memos,
                result: Err(TransactionError::ProgramAccountNotFound),
            };
        };
        logs.push(format!("Program {} invoke [1]", program));

        if *program == memo_program {
            match std::str::from_utf8(&ix.data) {
                Ok(text) => {
                    logs.push(format!("Program log: Memo (len {}): {:?}", ix.data.len(), text));
                    logs.push(format!("Program {} success", program));
                    memos.push(ix.data.clone());
                }
                Err(_) => {
                    logs.push(format!("Program {} failed: invalid utf-8", program));
                    return Execution {
                        logs,
                        memos,
                        result: Err(failed(InstructionError::InvalidInstructionData)),
                    };
                }
            }
            continue;
        }

        if program != program_id {
            logs.push(format!("Program {} failed: unsupported program id", program));
            return Execution {
                logs,
                memos,
                result: Err(failed(InstructionError::UnsupportedProgramId)),
            };
        }

        let mut accounts = Vec::with_capacity(ix.accounts.len());
        for &account_index in &ix.accounts {
            let Some(key) = keys.get(account_index as usize) else {
                return Execution {
                    logs,
                    memos,
                    result: Err(failed(InstructionError::NotEnoughAccountKeys)),
                };
            };
            accounts.push(InstructionAccount {
                key: *key,
                is_signer: (account_index as usize) < signer_count,
                lamports: scratch.balances.get(key).copied().unwrap_or(0),
            });
        }

        let transition = match processor::process(
            program_id,
            config,
            scratch.game.as_ref(),
            &accounts,
            &ix.data,
            now,
        ) {
            Ok(transition) => transition,
            Err(e) => {
                logs.push(format!("Program log: Error: {}", e));
                logs.push(format!(
                    "Program {} failed: custom program error: {:#x}",
                    program,
                    e.code()
                ));
                return Execution {
                    logs,
                    memos,
                    result: Err(failed(InstructionError::Custom(e.code()))),
                };
            }
        };

        for transfer in &transition.transfers {
            if let Err(error) = apply_transfer(&mut scratch.balances, transfer) {
                logs.push(format!("Program {} failed: {}", program, error));
                return Execution {
                    logs,
                    memos,
                    result: Err(failed(error)),
                };
            }
        }

        logs.extend(transition.logs);
        logs.push(format!("Program {} success", program));
        scratch.game = Some(transition.game);
        scratch.game_mutations += 1;
    }

    Execution {
        logs,
        memos,
        result: Ok(scratch),
    }
}

fn apply_transfer(
    balances: &mut HashMap<Pubkey, u64>,
    transfer: &Transfer,
) -> Result<(), InstructionError> {
    if transfer.lamports == 0 {
        return Ok(());
    }
    let from = balances.entry(transfer.from).or_insert(0);
    *from = from
        .checked_sub(transfer.lamports)
        .ok_or(InstructionError::InsufficientFunds)?;
    let to = balances.entry(transfer.to).or_insert(0);
    *to = to
        .checked_add(transfer.lamports)
        .ok_or(InstructionError::ArithmeticOverflow)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_rejects_overdraft_without_touching_receiver() {
        let from = Pubkey::new_unique();
        let to = Pubkey::new_unique();
        let mut balances = HashMap::from([(from, 10)]);
        let err = apply_transfer(&mut balances, &Transfer { from, to, lamports: 11 });
        assert_eq!(err, Err(InstructionError::InsufficientFunds));
        assert_eq!(balances.get(&to), None);

        apply_transfer(&mut balances, &Transfer { from, to, lamports: 4 }).unwrap();
        assert_eq!(balances[&from], 6);
        assert_eq!(balances[&to], 4);
    }
}

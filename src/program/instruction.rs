//! Instruction codec and account lists
//!
//! Data is an 8-byte sighash (`sha256("global:<name>")[..8]`) followed by
//! little-endian arguments, so the program is callable by Anchor clients.

use super::errors::GameError;
use crate::account::{discriminator, game_address};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_program,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameInstruction {
    Initialize { start_price: u64 },
    UsurpThrone,
    ClaimJackpot,
}

impl GameInstruction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Initialize { .. } => "initialize",
            Self::UsurpThrone => "usurp_throne",
            Self::ClaimJackpot => "claim_jackpot",
        }
    }

    fn sighash(name: &str) -> [u8; 8] {
        discriminator("global", name)
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut data = Self::sighash(self.name()).to_vec();
        if let Self::Initialize { start_price } = self {
            data.extend_from_slice(&start_price.to_le_bytes());
        }
        data
    }

    pub fn unpack(data: &[u8]) -> Result<Self, GameError> {
        if data.len() < 8 {
            return Err(GameError::InvalidInstruction);
        }
        let (tag, rest) = data.split_at(8);

        if tag == Self::sighash("initialize") {
            let bytes: [u8; 8] = rest
                .get(..8)
                .and_then(|b| b.try_into().ok())
                .ok_or(GameError::InvalidInstruction)?;
            Ok(Self::Initialize {
                start_price: u64::from_le_bytes(bytes),
            })
        } else if tag == Self::sighash("usurp_throne") {
            Ok(Self::UsurpThrone)
        } else if tag == Self::sighash("claim_jackpot") {
            Ok(Self::ClaimJackpot)
        } else {
            Err(GameError::InvalidInstruction)
        }
    }
}

/// `initialize` accounts: game, creator (signer), system program
pub fn initialize(program_id: &Pubkey, creator: &Pubkey, start_price: u64) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(*creator, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: GameInstruction::Initialize { start_price }.pack(),
    }
}

/// `usurp_throne` accounts: game, new holder (signer), previous holder,
/// fee beneficiary, system program
pub fn usurp_throne(
    program_id: &Pubkey,
    new_holder: &Pubkey,
    previous_holder: &Pubkey,
    fee_beneficiary: &Pubkey,
) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(*new_holder, true),
            AccountMeta::new(*previous_holder, false),
            AccountMeta::new(*fee_beneficiary, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: GameInstruction::UsurpThrone.pack(),
    }
}

/// `claim_jackpot` accounts: game, holder (signer), system program
pub fn claim_jackpot(program_id: &Pubkey, holder: &Pubkey) -> Instruction {
    let (game, _) = game_address(program_id);
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(game, false),
            AccountMeta::new(*holder, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data: GameInstruction::ClaimJackpot.pack(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        for ix in [
            GameInstruction::Initialize { start_price: 100_000_000 },
            GameInstruction::UsurpThrone,
            GameInstruction::ClaimJackpot,
        ] {
            assert_eq!(GameInstruction::unpack(&ix.pack()), Ok(ix));
        }
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert_eq!(GameInstruction::unpack(&[1, 2, 3]), Err(GameError::InvalidInstruction));
        assert_eq!(
            GameInstruction::unpack(&[0u8; 8]),
            Err(GameError::InvalidInstruction)
        );
        // initialize without its argument
        let truncated = &GameInstruction::Initialize { start_price: 1 }.pack()[..8];
        assert_eq!(
            GameInstruction::unpack(truncated),
            Err(GameError::InvalidInstruction)
        );
    }

    #[test]
    fn test_usurp_account_order() {
        let program_id = Pubkey::new_unique();
        let (bidder, prev, fee) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let ix = usurp_throne(&program_id, &bidder, &prev, &fee);
        assert_eq!(ix.accounts[0].pubkey, game_address(&program_id).0);
        assert!(ix.accounts[1].is_signer);
        assert_eq!(ix.accounts[2].pubkey, prev);
        assert_eq!(ix.accounts[3].pubkey, fee);
        assert!(!ix.accounts[2].is_signer && !ix.accounts[3].is_signer);
    }
}

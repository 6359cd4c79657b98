//! State transitions of the auction program
//!
//! Transitions are pure: each takes the current game record (if any) and the
//! invocation inputs, and returns a [`Transition`] describing the new record,
//! the lamport movements and the log output. Nothing is mutated here; the
//! host ledger applies a transition only when the whole transaction
//! succeeds, which is what makes every instruction all-or-nothing.
//!
//! The `previous_holder` account cited by a bid acts as a compare-and-swap
//! guard on the record: when two challengers race on the same view, the
//! ledger serializes them and the second one fails with
//! [`GameError::StaleChallenge`].

use super::errors::GameError;
use super::instruction::GameInstruction;
use super::math::BidQuote;
use crate::account::{game_address, GameAccount};
use crate::constants::ROUND_DURATION_SECS;
use crate::event::ThroneUsurped;
use solana_sdk::pubkey::Pubkey;

/// What happens to the round once the jackpot is claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimPolicy {
    /// Keep price and deadline; the game stays closed and further claims
    /// transfer nothing
    #[default]
    Freeze,
    /// Reopen bidding: price resets to `start_price`, the deadline moves a
    /// full round ahead and the throne returns to the fee beneficiary
    Rearm { start_price: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramConfig {
    pub claim_policy: ClaimPolicy,
}

/// An account as seen by an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionAccount {
    pub key: Pubkey,
    pub is_signer: bool,
    pub lamports: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: Pubkey,
    pub to: Pubkey,
    pub lamports: u64,
}

/// Result of a successful instruction, not yet applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub game: GameAccount,
    pub transfers: Vec<Transfer>,
    pub event: Option<ThroneUsurped>,
    pub logs: Vec<String>,
}

/// Create the game record. The caller becomes both holder and the permanent
/// fee beneficiary.
pub fn initialize(
    current: Option<&GameAccount>,
    creator: &InstructionAccount,
    start_price: u64,
    now: i64,
) -> Result<Transition, GameError> {
    if current.is_some() {
        return Err(GameError::AlreadyInitialized);
    }
    if !creator.is_signer {
        return Err(GameError::MissingSigner);
    }
    let deadline = now
        .checked_add(ROUND_DURATION_SECS)
        .ok_or(GameError::ArithmeticOverflow)?;

    let game = GameAccount {
        title_holder: creator.key,
        price: start_price,
        deadline,
        jackpot: 0,
        fee_beneficiary: creator.key,
    };

    Ok(Transition {
        game,
        transfers: vec![],
        event: None,
        logs: vec![format!(
            "Program log: Game initialized, fee beneficiary {}",
            creator.key
        )],
    })
}

/// Take the throne from `claimed_previous_holder`.
///
/// Checks, in order: fee beneficiary, stale view, deadline, funds. The
/// beneficiary check comes first so a redirect attempt is always reported
/// as such.
pub fn usurp_throne(
    current: Option<&GameAccount>,
    game_key: &Pubkey,
    bidder: &InstructionAccount,
    claimed_previous_holder: &Pubkey,
    claimed_beneficiary: &Pubkey,
    now: i64,
) -> Result<Transition, GameError> {
    let game = current.ok_or(GameError::NotInitialized)?;
    if !bidder.is_signer {
        return Err(GameError::MissingSigner);
    }
    if *claimed_beneficiary != game.fee_beneficiary {
        return Err(GameError::WrongFeeBeneficiary);
    }
    if *claimed_previous_holder != game.title_holder {
        return Err(GameError::StaleChallenge);
    }
    if game.round_over(now) {
        return Err(GameError::RoundEnded);
    }

    let quote = BidQuote::for_price(game.price)?;
    if bidder.lamports < quote.new_price {
        return Err(GameError::InsufficientFunds);
    }

    let jackpot = game
        .jackpot
        .checked_add(quote.jackpot_delta)
        .ok_or(GameError::ArithmeticOverflow)?;
    let deadline = now
        .checked_add(ROUND_DURATION_SECS)
        .ok_or(GameError::ArithmeticOverflow)?;

    let next = GameAccount {
        title_holder: bidder.key,
        price: quote.new_price,
        deadline,
        jackpot,
        fee_beneficiary: game.fee_beneficiary,
    };

    let transfers = vec![
        Transfer {
            from: bidder.key,
            to: game.title_holder,
            lamports: quote.refund,
        },
        Transfer {
            from: bidder.key,
            to: *game_key,
            lamports: quote.jackpot_delta,
        },
    ];

    let event = ThroneUsurped {
        new_holder: bidder.key,
        previous_holder: game.title_holder,
        price: quote.new_price,
        timestamp: now,
    };

    Ok(Transition {
        game: next,
        transfers,
        logs: vec![
            event.to_log_line(),
            format!(
                "Program log: New holder! Price: {} | Jackpot: {}",
                next.price, next.jackpot
            ),
        ],
        event: Some(event),
    })
}

/// Pay the jackpot to the holder once the round is over.
///
/// A claim with an already drained jackpot succeeds and moves nothing.
pub fn claim_jackpot(
    current: Option<&GameAccount>,
    game_key: &Pubkey,
    caller: &InstructionAccount,
    now: i64,
    policy: ClaimPolicy,
) -> Result<Transition, GameError> {
    let game = current.ok_or(GameError::NotInitialized)?;
    if !caller.is_signer {
        return Err(GameError::MissingSigner);
    }
    if !game.round_over(now) {
        return Err(GameError::RoundNotOver);
    }
    if caller.key != game.title_holder {
        return Err(GameError::NotTheHolder);
    }

    let amount = game.jackpot;
    let mut next = GameAccount { jackpot: 0, ..*game };
    if let ClaimPolicy::Rearm { start_price } = policy {
        next.price = start_price;
        next.deadline = now
            .checked_add(ROUND_DURATION_SECS)
            .ok_or(GameError::ArithmeticOverflow)?;
        next.title_holder = game.fee_beneficiary;
    }

    let transfers = if amount > 0 {
        vec![Transfer {
            from: *game_key,
            to: caller.key,
            lamports: amount,
        }]
    } else {
        vec![]
    };

    Ok(Transition {
        game: next,
        transfers,
        event: None,
        logs: vec![format!("Program log: Jackpot claimed: {}", amount)],
    })
}

/// Decode an instruction and dispatch it.
///
/// `accounts` follow the order of the instruction builders in
/// [`super::instruction`].
pub fn process(
    program_id: &Pubkey,
    config: &ProgramConfig,
    current: Option<&GameAccount>,
    accounts: &[InstructionAccount],
    data: &[u8],
    now: i64,
) -> Result<Transition, GameError> {
    let instruction = GameInstruction::unpack(data)?;
    let game_account = accounts.first().ok_or(GameError::InvalidInstruction)?;
    if game_account.key != game_address(program_id).0 {
        return Err(GameError::InvalidGameAddress);
    }

    match instruction {
        GameInstruction::Initialize { start_price } => {
            let creator = accounts.get(1).ok_or(GameError::InvalidInstruction)?;
            initialize(current, creator, start_price, now)
        }
        GameInstruction::UsurpThrone => {
            let [_, bidder, previous, beneficiary, ..] = accounts else {
                return Err(GameError::InvalidInstruction);
            };
            usurp_throne(
                current,
                &game_account.key,
                bidder,
                &previous.key,
                &beneficiary.key,
                now,
            )
        }
        GameInstruction::ClaimJackpot => {
            let caller = accounts.get(1).ok_or(GameError::InvalidInstruction)?;
            claim_jackpot(current, &game_account.key, caller, now, config.claim_policy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const START: u64 = 100_000_000;

    fn signer(key: Pubkey, lamports: u64) -> InstructionAccount {
        InstructionAccount {
            key,
            is_signer: true,
            lamports,
        }
    }

    fn fresh_game() -> (GameAccount, Pubkey) {
        let creator = Pubkey::new_unique();
        let t = initialize(None, &signer(creator, 0), START, NOW).unwrap();
        (t.game, creator)
    }

    #[test]
    fn test_initialize_sets_fields() {
        let (game, creator) = fresh_game();
        assert_eq!(game.title_holder, creator);
        assert_eq!(game.fee_beneficiary, creator);
        assert_eq!(game.price, START);
        assert_eq!(game.jackpot, 0);
        assert_eq!(game.deadline, NOW + ROUND_DURATION_SECS);
    }

    #[test]
    fn test_initialize_twice_fails() {
        let (game, creator) = fresh_game();
        assert_eq!(
            initialize(Some(&game), &signer(creator, 0), START, NOW),
            Err(GameError::AlreadyInitialized)
        );
    }

    #[test]
    fn test_usurp_moves_funds_and_emits() {
        let (game, creator) = fresh_game();
        let game_key = Pubkey::new_unique();
        let bidder = Pubkey::new_unique();
        let t = usurp_throne(
            Some(&game),
            &game_key,
            &signer(bidder, 1_000_000_000),
            &creator,
            &creator,
            NOW + 60,
        )
        .unwrap();

        assert_eq!(t.game.title_holder, bidder);
        assert_eq!(t.game.price, 130_000_000);
        assert_eq!(t.game.jackpot, 15_000_000);
        assert_eq!(t.game.deadline, NOW + 60 + ROUND_DURATION_SECS);
        assert_eq!(t.transfers[0], Transfer { from: bidder, to: creator, lamports: 115_000_000 });
        assert_eq!(t.transfers[1], Transfer { from: bidder, to: game_key, lamports: 15_000_000 });
        let event = t.event.unwrap();
        assert_eq!(event.new_holder, bidder);
        assert_eq!(event.previous_holder, creator);
        assert_eq!(ThroneUsurped::from_logs(&t.logs), Some(event));
    }

    #[test]
    fn test_wrong_beneficiary_wins_over_other_failures() {
        let (game, _creator) = fresh_game();
        let thief = Pubkey::new_unique();
        // stale holder, expired round and no funds: still a redirect attempt
        let err = usurp_throne(
            Some(&game),
            &Pubkey::new_unique(),
            &signer(Pubkey::new_unique(), 0),
            &Pubkey::new_unique(),
            &thief,
            game.deadline + 1,
        )
        .unwrap_err();
        assert_eq!(err, GameError::WrongFeeBeneficiary);
    }

    #[test]
    fn test_usurp_rejections() {
        let (game, creator) = fresh_game();
        let key = Pubkey::new_unique();
        let bidder = signer(Pubkey::new_unique(), u64::MAX);

        assert_eq!(
            usurp_throne(Some(&game), &key, &bidder, &Pubkey::new_unique(), &creator, NOW),
            Err(GameError::StaleChallenge)
        );
        assert_eq!(
            usurp_throne(Some(&game), &key, &bidder, &creator, &creator, game.deadline),
            Err(GameError::RoundEnded)
        );
        assert_eq!(
            usurp_throne(Some(&game), &key, &signer(bidder.key, 129_999_999), &creator, &creator, NOW),
            Err(GameError::InsufficientFunds)
        );
        assert_eq!(
            usurp_throne(None, &key, &bidder, &creator, &creator, NOW),
            Err(GameError::NotInitialized)
        );
        let unsigned = InstructionAccount { is_signer: false, ..bidder };
        assert_eq!(
            usurp_throne(Some(&game), &key, &unsigned, &creator, &creator, NOW),
            Err(GameError::MissingSigner)
        );
    }

    #[test]
    fn test_claim_gating() {
        let (mut game, creator) = fresh_game();
        game.jackpot = 42;
        let key = Pubkey::new_unique();

        assert_eq!(
            claim_jackpot(Some(&game), &key, &signer(creator, 0), game.deadline - 1, ClaimPolicy::Freeze),
            Err(GameError::RoundNotOver)
        );
        assert_eq!(
            claim_jackpot(Some(&game), &key, &signer(Pubkey::new_unique(), 0), game.deadline, ClaimPolicy::Freeze),
            Err(GameError::NotTheHolder)
        );

        let t = claim_jackpot(Some(&game), &key, &signer(creator, 0), game.deadline, ClaimPolicy::Freeze).unwrap();
        assert_eq!(t.game.jackpot, 0);
        assert_eq!(t.game.deadline, game.deadline);
        assert_eq!(t.transfers, vec![Transfer { from: key, to: creator, lamports: 42 }]);

        // second claim is a zero-transfer success
        let again = claim_jackpot(Some(&t.game), &key, &signer(creator, 0), game.deadline + 5, ClaimPolicy::Freeze).unwrap();
        assert!(again.transfers.is_empty());
        assert_eq!(again.game, t.game);
    }

    #[test]
    fn test_claim_rearm_reopens_round() {
        let (mut game, creator) = fresh_game();
        let winner = Pubkey::new_unique();
        game.title_holder = winner;
        game.price = 500;
        game.jackpot = 77;
        let now = game.deadline + 10;

        let t = claim_jackpot(
            Some(&game),
            &Pubkey::new_unique(),
            &signer(winner, 0),
            now,
            ClaimPolicy::Rearm { start_price: START },
        )
        .unwrap();
        assert_eq!(t.game.title_holder, creator);
        assert_eq!(t.game.price, START);
        assert_eq!(t.game.deadline, now + ROUND_DURATION_SECS);
        assert_eq!(t.game.jackpot, 0);
    }

    #[test]
    fn test_process_checks_game_address() {
        let program_id = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let data = GameInstruction::Initialize { start_price: START }.pack();
        let accounts = [
            InstructionAccount { key: Pubkey::new_unique(), is_signer: false, lamports: 0 },
            signer(creator, 0),
        ];
        assert_eq!(
            process(&program_id, &ProgramConfig::default(), None, &accounts, &data, NOW),
            Err(GameError::InvalidGameAddress)
        );

        let accounts = [
            InstructionAccount { key: game_address(&program_id).0, is_signer: false, lamports: 0 },
            signer(creator, 0),
        ];
        let t = process(&program_id, &ProgramConfig::default(), None, &accounts, &data, NOW).unwrap();
        assert_eq!(t.game.fee_beneficiary, creator);
    }
}

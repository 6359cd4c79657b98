//! Bid pricing
//!
//! Integer arithmetic only, floored at every step, so a client computing a
//! quote locally arrives at exactly the lamports the program moves.

use super::errors::GameError;
use crate::constants::{BPS_DENOMINATOR, RAISE_BPS, REFUND_BPS};

/// Lamport flows of one successful bid against a given price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidQuote {
    /// Price before the bid
    pub old_price: u64,
    /// What the challenger pays, which also becomes the new price
    pub new_price: u64,
    /// Paid to the dethroned holder: stake plus premium
    pub refund: u64,
    /// Added to the jackpot
    pub jackpot_delta: u64,
}

fn apply_bps(amount: u64, bps: u64) -> Result<u64, GameError> {
    let scaled = (amount as u128) * (bps as u128) / (BPS_DENOMINATOR as u128);
    u64::try_from(scaled).map_err(|_| GameError::ArithmeticOverflow)
}

impl BidQuote {
    pub fn for_price(old_price: u64) -> Result<Self, GameError> {
        let new_price = apply_bps(old_price, RAISE_BPS)?;
        let refund = apply_bps(old_price, REFUND_BPS)?;
        // floor(p * 1.30) >= floor(p * 1.15) for every p
        let jackpot_delta = new_price
            .checked_sub(refund)
            .ok_or(GameError::ArithmeticOverflow)?;

        Ok(Self {
            old_price,
            new_price,
            refund,
            jackpot_delta,
        })
    }
}

/// Price after `bids` successful bids starting at `start_price`
pub fn price_after(start_price: u64, bids: u32) -> Result<u64, GameError> {
    (0..bids).try_fold(start_price, |price, _| {
        BidQuote::for_price(price).map(|q| q.new_price)
    })
}

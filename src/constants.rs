//! Protocol constants shared by the program, the ledger and the client

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Seed of the single game account's program-derived address
pub const GAME_SEED: &[u8] = b"game_v1";

/// Length of a round after every successful bid (24 hours)
pub const ROUND_DURATION_SECS: i64 = 86_400;

// Pricing, in basis points of the current price
pub const BPS_DENOMINATOR: u64 = 10_000;
/// Next bid = price * 1.30
pub const RAISE_BPS: u64 = 13_000;
/// Refund to the dethroned holder = price * 1.15
pub const REFUND_BPS: u64 = 11_500;

/// Default opening price (0.1 SOL)
pub const DEFAULT_START_PRICE: u64 = 100_000_000;

/// Maximum characters of a broadcast message
pub const MAX_MESSAGE_LEN: usize = 32;

/// Tag prefixed to memo data carrying a bid message
pub const MESSAGE_TAG: &str = "throne:msg:";

/// SPL Memo program (v2)
pub const MEMO_PROGRAM_ID: &str = "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr";

/// Deployed program id
pub const DEFAULT_PROGRAM_ID: &str = "4jZ5W4jnLTuycfTxREkNq4nQxQZfswHF2HEg4NNtGgDe";

/// Blocks a recent blockhash stays valid for
pub const BLOCKHASH_VALIDITY_BLOCKS: u64 = 150;

/// Back-off after a rate-limit response
pub const RATE_LIMIT_COOLDOWN_SECS: u64 = 15;

/// Anchor custom error codes start here
pub const ERROR_CODE_OFFSET: u32 = 6_000;

/// Log prefix for serialized events
pub const PROGRAM_DATA_PREFIX: &str = "Program data: ";

use solana_client::client_error::ClientError;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failures of the read and submit paths
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Endpoint unreachable (connection refused, DNS, TLS, reset)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    #[error("Request timed out (endpoint: {endpoint})")]
    Timeout { endpoint: String },

    /// Any other error answered by the node
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// HTTP 429 or equivalent
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Account not found (endpoint: {endpoint})")]
    AccountNotFound { endpoint: String },

    #[error("Insufficient funds for fee or transfer (endpoint: {endpoint})")]
    InsufficientFunds { endpoint: String },

    /// Response received but not understood
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Subscription error: {0}")]
    Subscription(String),
}

#[derive(Clone, Copy)]
enum Kind {
    BlockhashNotFound,
    TransactionExpired,
    AccountNotFound,
    InsufficientFunds,
    RateLimited,
    Timeout,
    Transport,
}

/// Lowercase needles, checked in order; the first hit wins
const CLASSIFICATION: &[(&str, Kind)] = &[
    ("blockhash not found", Kind::BlockhashNotFound),
    ("transaction expired", Kind::TransactionExpired),
    ("block height exceeded", Kind::TransactionExpired),
    ("account not found", Kind::AccountNotFound),
    ("account does not exist", Kind::AccountNotFound),
    ("insufficient funds", Kind::InsufficientFunds),
    ("insufficient lamports", Kind::InsufficientFunds),
    ("too many requests", Kind::RateLimited),
    ("rate limit", Kind::RateLimited),
    ("429", Kind::RateLimited),
    ("timed out", Kind::Timeout),
    ("timeout", Kind::Timeout),
    ("error sending request", Kind::Transport),
    ("connection refused", Kind::Transport),
    ("connection reset", Kind::Transport),
    ("dns error", Kind::Transport),
];

impl RpcManagerError {
    /// Whether the same request may succeed if simply repeated
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::RateLimitExceeded { .. }
            | Self::BlockhashNotFound { .. }
            | Self::Subscription(_) => true,
            // 5xx from the node
            Self::RpcResponse { code, .. } => matches!(code, Some(c) if (500..600).contains(c)),
            Self::TransactionExpired { .. }
            | Self::AccountNotFound { .. }
            | Self::InsufficientFunds { .. }
            | Self::Decode(_) => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Timeout { endpoint }
            | Self::RpcResponse { endpoint, .. }
            | Self::RateLimitExceeded { endpoint }
            | Self::BlockhashNotFound { endpoint }
            | Self::TransactionExpired { endpoint }
            | Self::AccountNotFound { endpoint }
            | Self::InsufficientFunds { endpoint } => Some(endpoint),
            Self::Decode(_) | Self::Subscription(_) => None,
        }
    }

    pub fn from_client_error(err: ClientError, endpoint: &str) -> Self {
        Self::classify(&err.to_string(), endpoint)
    }

    /// Classify an error message from any RPC layer
    pub fn classify(message: &str, endpoint: &str) -> Self {
        let lowered = message.to_lowercase();
        let endpoint = endpoint.to_string();
        let kind = CLASSIFICATION
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, kind)| *kind);

        match kind {
            Some(Kind::BlockhashNotFound) => Self::BlockhashNotFound { endpoint },
            Some(Kind::TransactionExpired) => Self::TransactionExpired { endpoint },
            Some(Kind::AccountNotFound) => Self::AccountNotFound { endpoint },
            Some(Kind::InsufficientFunds) => Self::InsufficientFunds { endpoint },
            Some(Kind::RateLimited) => Self::RateLimitExceeded { endpoint },
            Some(Kind::Timeout) => Self::Timeout { endpoint },
            Some(Kind::Transport) => Self::Transport {
                endpoint,
                message: message.to_string(),
            },
            None => Self::RpcResponse {
                endpoint,
                message: message.to_string(),
                code: response_code(&lowered),
            },
        }
    }
}

/// `code: <n>` embedded in a node error message
fn response_code(lowered: &str) -> Option<i64> {
    let (_, rest) = lowered.split_once("code:")?;
    rest.split_whitespace()
        .next()?
        .trim_end_matches(',')
        .parse()
        .ok()
}

/// Exponential backoff with jitter for transient RPC failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay randomly added or removed (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), `None` once exhausted
    pub fn delay_for(&self, retry: u32) -> Option<Duration> {
        if retry >= self.max_retries {
            return None;
        }
        let base = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay);
        let spread = (rand::random::<f64>() * 2.0 - 1.0) * self.jitter;
        Some(base.mul_f64((1.0 + spread).max(0.0)))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, hits a
/// rate limit, or the policy runs out of retries.
///
/// Rate limits are returned immediately; the reconciler's cooldown owns
/// that backoff.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RpcManagerError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RpcManagerError>>,
{
    let mut retry = 0;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retryable() || err.is_rate_limited() {
            return Err(err);
        }
        let Some(delay) = policy.delay_for(retry) else {
            return Err(err);
        };
        tracing::debug!(retry, delay_ms = delay.as_millis() as u64, error = %err, "Retrying RPC call");
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

//! Structured log events for the client pipeline

use crate::event::GameEvent;
use crate::observability::CorrelationId;
use solana_sdk::{pubkey::Pubkey, signature::Signature};

/// Emits domain events with a fixed context id
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: impl Into<String>) -> Self {
        Self {
            context_id: context_id.into(),
        }
    }

    pub fn for_correlation(id: &CorrelationId) -> Self {
        Self::new(id.to_string())
    }

    pub fn log_bid_attempt(&self, bidder: &Pubkey, previous_holder: &Pubkey) {
        tracing::info!(
            context_id = %self.context_id,
            bidder = %bidder,
            previous_holder = %previous_holder,
            "Attempting to usurp the throne"
        );
    }

    pub fn log_submission_sent(&self, action: &str, signature: &Signature) {
        tracing::info!(
            context_id = %self.context_id,
            action = %action,
            signature = %signature,
            "Transaction sent"
        );
    }

    pub fn log_submission_outcome(&self, action: &str, signature: Option<&Signature>, outcome: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            action = %action,
            signature = ?signature.map(|s| s.to_string()),
            outcome = %outcome,
            latency_ms = latency_ms,
            "Submission finished"
        );
    }

    pub fn log_history_merge(&self, source: &str, incoming: usize, added: usize, newest: Option<&GameEvent>) {
        tracing::debug!(
            context_id = %self.context_id,
            source = %source,
            incoming = incoming,
            added = added,
            newest = ?newest.map(|e| e.signature.to_string()),
            "History merged"
        );
    }

    pub fn log_cooldown(&self, endpoint: &str, secs: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            endpoint = %endpoint,
            cooldown_secs = secs,
            "Rate limited, suppressing fetches"
        );
    }

    pub fn log_account_transition(&self, from: &str, to: &str, slot: u64) {
        tracing::info!(
            context_id = %self.context_id,
            from = %from,
            to = %to,
            slot = slot,
            "Game view changed"
        );
    }

    /// Push path gone; `reason` is the subscribe error, `None` when the
    /// stream closed on its own
    pub fn log_push_lost(&self, reason: Option<String>) {
        match reason {
            Some(reason) => tracing::warn!(
                context_id = %self.context_id,
                reason = %reason,
                "Push subscription unavailable, polling only"
            ),
            None => tracing::warn!(
                context_id = %self.context_id,
                "Push subscription closed, polling only"
            ),
        }
    }
}

//! Non-blocking submission and confirmation tracking
//!
//! [`Submitter::submit`] returns at once with a [`PendingSubmission`]; the
//! build, sign, send and confirm steps run on a spawned task. Signing may
//! wait on a wallet indefinitely without holding up anything else.
//!
//! The confirmation loop ends in exactly one of:
//! - confirmed
//! - rejected (the transaction landed and failed, or preflight refused it)
//! - expired (block height passed the blockhash's last valid height while
//!   the signature was still unknown)
//! - declined (the signer refused)

use super::builder::TxBuilder;
use super::context::ExecutionContext;
use super::errors::SubmissionError;
use super::instructions::GameAction;
use crate::constants::RATE_LIMIT_COOLDOWN_SECS;
use crate::event::BidMessage;
use crate::metrics::{metrics, Timer};
use crate::observability::{CorrelationId, TraceContext};
use crate::optimistic::Optimistic;
use crate::rpc::ChainClient;
use crate::structured_logging::StructuredLogger;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

#[derive(Debug, Clone)]
pub enum SubmissionStatus {
    InFlight,
    Confirmed { signature: Signature },
    Failed(SubmissionError),
}

impl SubmissionStatus {
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::InFlight)
    }
}

/// Latest message sent by this client, tagged with the submission that
/// owns the current phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestMessage {
    pub submission: CorrelationId,
    pub state: Optimistic<BidMessage>,
}

/// Handle on a running submission
pub struct PendingSubmission {
    pub action: GameAction,
    pub trace: TraceContext,
    status: watch::Receiver<SubmissionStatus>,
    task: JoinHandle<Result<Signature, SubmissionError>>,
}

impl PendingSubmission {
    pub fn status(&self) -> SubmissionStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn watch(&self) -> watch::Receiver<SubmissionStatus> {
        self.status.clone()
    }

    /// Wait for the final outcome
    pub async fn outcome(self) -> Result<Signature, SubmissionError> {
        self.task
            .await
            .map_err(|e| SubmissionError::Internal(format!("submission task failed: {}", e)))?
    }
}

#[derive(Clone)]
pub struct Submitter {
    client: Arc<dyn ChainClient>,
    builder: Arc<TxBuilder>,
    confirm_poll_interval: Duration,
    latest_message: Arc<watch::Sender<Option<LatestMessage>>>,
}

impl Submitter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        builder: Arc<TxBuilder>,
        confirm_poll_interval: Duration,
    ) -> Self {
        let (latest_message, _) = watch::channel(None);
        Self {
            client,
            builder,
            confirm_poll_interval,
            latest_message: Arc::new(latest_message),
        }
    }

    pub fn builder(&self) -> &TxBuilder {
        &self.builder
    }

    /// Observe the optimistic "latest message" slot
    pub fn latest_message(&self) -> watch::Receiver<Option<LatestMessage>> {
        self.latest_message.subscribe()
    }

    /// Dispatch `action` and return immediately
    pub fn submit(&self, action: GameAction, message: Option<BidMessage>) -> PendingSubmission {
        let trace = TraceContext::new(action.name());
        let (status_tx, status_rx) = watch::channel(SubmissionStatus::InFlight);
        metrics().submissions_total.inc();

        if let Some(message) = &message {
            self.latest_message.send_replace(Some(LatestMessage {
                submission: trace.correlation_id().clone(),
                state: Optimistic::Pending(message.clone()),
            }));
        }

        let this = self.clone();
        let task_trace = trace.clone();
        let span = trace.span();
        let task = tokio::spawn(
            async move {
                let logger = StructuredLogger::for_correlation(task_trace.correlation_id());
                let timer = Timer::with_name("confirm_latency_seconds");
                let result = this
                    .run(action, message, task_trace.clone(), &logger)
                    .await;

                let outcome = match &result {
                    Ok(_) => "confirmed",
                    Err(e) => e.category(),
                };
                let latency_ms = (timer.elapsed_secs() * 1000.0) as u64;
                timer.finish();
                logger.log_submission_outcome(action.name(), result.as_ref().ok(), outcome, latency_ms);
                this.settle_message(task_trace.correlation_id(), &result);
                record_outcome(&result);

                status_tx.send_replace(match &result {
                    Ok(signature) => SubmissionStatus::Confirmed {
                        signature: *signature,
                    },
                    Err(e) => SubmissionStatus::Failed(e.clone()),
                });
                result
            }
            .instrument(span),
        );

        PendingSubmission {
            action,
            trace,
            status: status_rx,
            task,
        }
    }

    async fn run(
        &self,
        action: GameAction,
        message: Option<BidMessage>,
        trace: TraceContext,
        logger: &StructuredLogger,
    ) -> Result<Signature, SubmissionError> {
        let context = ExecutionContext::prepare(self.client.as_ref(), trace).await?;
        if let GameAction::Usurp {
            previous_holder, ..
        } = action
        {
            logger.log_bid_attempt(&self.builder.payer(), &previous_holder);
        }

        let output = self.builder.build(action, message, &context).await?;

        // Approval may have outlived the blockhash
        let height = self.client.block_height().await?;
        if context.is_expired_at(height) {
            return Err(SubmissionError::Expired {
                last_valid_block_height: context.last_valid_block_height,
            });
        }

        let signature = self
            .client
            .send_transaction(&output.tx)
            .await
            .map_err(|e| SubmissionError::from_send_error(e, context.last_valid_block_height))?;
        logger.log_submission_sent(action.name(), &signature);

        let confirm_span = context.trace_context.child_span("confirm").span();
        self.confirm(&signature, &context)
            .instrument(confirm_span)
            .await
    }

    async fn confirm(
        &self,
        signature: &Signature,
        context: &ExecutionContext,
    ) -> Result<Signature, SubmissionError> {
        let rate_limit_backoff = Duration::from_secs(RATE_LIMIT_COOLDOWN_SECS);
        loop {
            let mut delay = self.confirm_poll_interval;

            match self.client.signature_status(signature).await {
                Ok(Some(Ok(()))) => return Ok(*signature),
                Ok(Some(Err(e))) => return Err(SubmissionError::from_transaction_error(&e)),
                Ok(None) => {}
                Err(e) if e.is_rate_limited() => {
                    warn!(signature = %signature, "Status check rate limited, backing off");
                    delay = delay.max(rate_limit_backoff);
                }
                Err(e) if e.is_retryable() => {
                    warn!(signature = %signature, error = %e, "Status check failed, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            // Expiry is judged every round, whatever the status call said
            match self.client.block_height().await {
                Ok(height) if context.is_expired_at(height) => {
                    // One last look: it may have landed just before expiry
                    if let Ok(Some(status)) = self.client.signature_status(signature).await {
                        return status
                            .map(|_| *signature)
                            .map_err(|e| SubmissionError::from_transaction_error(&e));
                    }
                    return Err(SubmissionError::Expired {
                        last_valid_block_height: context.last_valid_block_height,
                    });
                }
                Ok(height) => debug!(signature = %signature, height, "Awaiting confirmation"),
                Err(e) if e.is_rate_limited() => delay = delay.max(rate_limit_backoff),
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Block height unavailable, retrying");
                }
                Err(e) => return Err(e.into()),
            }

            tokio::time::sleep(delay).await;
        }
    }

    fn settle_message(&self, owner: &CorrelationId, result: &Result<Signature, SubmissionError>) {
        self.latest_message.send_if_modified(|slot| match slot {
            Some(latest) if latest.submission == *owner && latest.state.is_pending() => {
                latest.state = match result {
                    Ok(_) => latest.state.clone().confirm(),
                    Err(e) => latest.state.clone().roll_back(e.to_string()),
                };
                true
            }
            _ => false,
        });
    }
}

fn record_outcome(result: &Result<Signature, SubmissionError>) {
    let m = metrics();
    match result {
        Ok(_) => m.submissions_confirmed.inc(),
        Err(SubmissionError::UserDeclined) => m.submissions_declined.inc(),
        Err(SubmissionError::Expired { .. }) => m.submissions_expired.inc(),
        Err(_) => m.submissions_rejected.inc(),
    }
}

//! Correlation ids and trace contexts
//!
//! Each submission gets a [`TraceContext`]; the build, sign, send and
//! confirm steps log under child spans of it so one bid can be followed
//! through the whole pipeline.

use std::fmt;
use uuid::Uuid;

/// Ties the optimistic message slot, logs and outcome of one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell concurrent submissions apart in logs
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub span_id: Uuid,
    pub parent_span_id: Option<Uuid>,
    pub correlation_id: CorrelationId,
    /// e.g. `usurp_throne` or `confirm`
    pub operation: &'static str,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl TraceContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            span_id: Uuid::new_v4(),
            parent_span_id: None,
            correlation_id: CorrelationId::new(),
            operation,
            started_at: chrono::Utc::now(),
        }
    }

    /// Same trace and correlation, new span parented to this one
    pub fn child_span(&self, operation: &'static str) -> Self {
        Self {
            span_id: Uuid::new_v4(),
            parent_span_id: Some(self.span_id),
            operation,
            started_at: chrono::Utc::now(),
            ..self.clone()
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "trace",
            operation = self.operation,
            trace_id = %self.trace_id,
            span_id = %self.span_id,
            parent = ?self.parent_span_id,
            correlation_id = %self.correlation_id,
        )
    }
}

//! Two-phase local state for values published before confirmation

use serde::{Deserialize, Serialize};

/// A locally asserted value and how far the ledger has agreed with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimistic<T> {
    /// Submitted, outcome unknown
    Pending(T),
    Confirmed(T),
    /// The submission failed; the value never became true
    RolledBack { value: T, reason: String },
}

impl<T> Optimistic<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Pending(v) | Self::Confirmed(v) => v,
            Self::RolledBack { value, .. } => value,
        }
    }

    /// Value a renderer should show, if any
    pub fn visible(&self) -> Option<&T> {
        match self {
            Self::Pending(v) | Self::Confirmed(v) => Some(v),
            Self::RolledBack { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn confirm(self) -> Self {
        match self {
            Self::Pending(v) => Self::Confirmed(v),
            settled => settled,
        }
    }

    pub fn roll_back(self, reason: impl Into<String>) -> Self {
        match self {
            Self::Pending(value) => Self::RolledBack {
                value,
                reason: reason.into(),
            },
            settled => settled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_transitions() {
        let confirmed = Optimistic::Pending("gm").confirm();
        assert_eq!(confirmed, Optimistic::Confirmed("gm"));
        assert_eq!(confirmed.clone().roll_back("late"), confirmed);

        let rolled = Optimistic::Pending("gm").roll_back("StaleChallenge");
        assert_eq!(rolled.visible(), None);
        assert_eq!(*rolled.value(), "gm");
        assert_eq!(rolled.clone().confirm(), rolled);
    }
}

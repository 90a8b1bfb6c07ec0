//! Remittance lifecycle
//!
//! Status machine for cross-branch remittances. A remittance is created
//! Pending and ends in exactly one of Paid, Withdrawn or Rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Remittance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemittanceStatus {
    /// Cash collected at the source branch, waiting for pickup
    Pending,
    /// Paid out to the receiver at the paying branch
    Paid,
    /// Cancelled by the sender before collection
    Withdrawn,
    /// Rejected by back office before collection
    Rejected,
}

impl RemittanceStatus {
    /// Check whether a lifecycle edge exists from `self` to `target`.
    ///
    /// Pending -> Paid | Withdrawn | Rejected are the only legal edges.
    pub fn can_transition_to(&self, target: RemittanceStatus) -> bool {
        matches!(
            (self, target),
            (
                RemittanceStatus::Pending,
                RemittanceStatus::Paid | RemittanceStatus::Withdrawn | RemittanceStatus::Rejected
            )
        )
    }

    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemittanceStatus::Pending)
    }

    /// Stable string form used in projections and API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemittanceStatus::Pending => "pending",
            RemittanceStatus::Paid => "paid",
            RemittanceStatus::Withdrawn => "withdrawn",
            RemittanceStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RemittanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RemittanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RemittanceStatus::Pending),
            "paid" => Ok(RemittanceStatus::Paid),
            "withdrawn" => Ok(RemittanceStatus::Withdrawn),
            "rejected" => Ok(RemittanceStatus::Rejected),
            other => Err(format!("Unknown remittance status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_transitions() {
        let pending = RemittanceStatus::Pending;
        assert!(pending.can_transition_to(RemittanceStatus::Paid));
        assert!(pending.can_transition_to(RemittanceStatus::Withdrawn));
        assert!(pending.can_transition_to(RemittanceStatus::Rejected));
        assert!(!pending.can_transition_to(RemittanceStatus::Pending));
        assert!(!pending.is_terminal());
    }

    #[test]
    fn test_terminal_statuses_admit_nothing() {
        for status in [
            RemittanceStatus::Paid,
            RemittanceStatus::Withdrawn,
            RemittanceStatus::Rejected,
        ] {
            assert!(status.is_terminal());
            for target in [
                RemittanceStatus::Pending,
                RemittanceStatus::Paid,
                RemittanceStatus::Withdrawn,
                RemittanceStatus::Rejected,
            ] {
                assert!(!status.can_transition_to(target));
            }
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RemittanceStatus::Pending,
            RemittanceStatus::Paid,
            RemittanceStatus::Withdrawn,
            RemittanceStatus::Rejected,
        ] {
            let parsed: RemittanceStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("collected".parse::<RemittanceStatus>().is_err());
    }

    #[test]
    fn test_status_serde_form() {
        let json = serde_json::to_string(&RemittanceStatus::Withdrawn).unwrap();
        assert_eq!(json, r#""withdrawn""#);
    }
}

//! Store lifecycle state machine (spec 4.2). Every transition the
//! orchestrator performs is validated here first; the registry layer then
//! persists it with an optimistic `WHERE status = $expected` guard so two
//! racing workers can never both win the same transition.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreStatus {
    Requested,
    Provisioning,
    Ready,
    Failed,
    Deleting,
    Deleted,
}

impl StoreStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "REQUESTED",
            Self::Provisioning => "PROVISIONING",
            Self::Ready => "READY",
            Self::Failed => "FAILED",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
        }
    }

    pub fn from_db(value: &str) -> Result<Self, String> {
        match value {
            "REQUESTED" => Ok(Self::Requested),
            "PROVISIONING" => Ok(Self::Provisioning),
            "READY" => Ok(Self::Ready),
            "FAILED" => Ok(Self::Failed),
            "DELETING" => Ok(Self::Deleting),
            "DELETED" => Ok(Self::Deleted),
            other => Err(format!("unknown store status {other}")),
        }
    }

    /// True once a store can no longer move: `DELETED` is the only true
    /// sink, `FAILED` is terminal for the create path but can still move
    /// to `DELETING` via a manual delete.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted)
    }

    pub fn can_delete(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn can_retry(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only legal edges. Anything not listed here is rejected regardless
/// of how plausible it looks.
const TRANSITIONS: &[(StoreStatus, StoreStatus)] = &[
    (StoreStatus::Requested, StoreStatus::Provisioning),
    (StoreStatus::Provisioning, StoreStatus::Ready),
    (StoreStatus::Provisioning, StoreStatus::Failed),
    (StoreStatus::Failed, StoreStatus::Provisioning),
    (StoreStatus::Ready, StoreStatus::Deleting),
    (StoreStatus::Failed, StoreStatus::Deleting),
    (StoreStatus::Deleting, StoreStatus::Deleted),
    (StoreStatus::Deleting, StoreStatus::Failed),
];

pub fn validate_transition(from: StoreStatus, to: StoreStatus) -> Result<(), crate::errors::AppError> {
    if TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(crate::errors::AppError::invalid_state_transition(
            from.as_str(),
            to.as_str(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_edge_is_legal() {
        for &(from, to) in TRANSITIONS {
            assert!(validate_transition(from, to).is_ok());
        }
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        assert!(validate_transition(StoreStatus::Requested, StoreStatus::Ready).is_err());
        assert!(validate_transition(StoreStatus::Deleted, StoreStatus::Ready).is_err());
    }

    #[test]
    fn deleted_is_the_only_terminal_state() {
        assert!(StoreStatus::Deleted.is_terminal());
        assert!(!StoreStatus::Failed.is_terminal());
        assert!(!StoreStatus::Ready.is_terminal());
    }

    #[test]
    fn only_ready_and_failed_stores_can_be_deleted() {
        assert!(StoreStatus::Ready.can_delete());
        assert!(StoreStatus::Failed.can_delete());
        assert!(!StoreStatus::Provisioning.can_delete());
        assert!(!StoreStatus::Deleted.can_delete());
    }

    #[test]
    fn only_failed_stores_can_retry() {
        assert!(StoreStatus::Failed.can_retry());
        assert!(!StoreStatus::Ready.can_retry());
    }

    #[test]
    fn db_roundtrip_is_lossless() {
        for status in [
            StoreStatus::Requested,
            StoreStatus::Provisioning,
            StoreStatus::Ready,
            StoreStatus::Failed,
            StoreStatus::Deleting,
            StoreStatus::Deleted,
        ] {
            assert_eq!(StoreStatus::from_db(status.as_str()).unwrap(), status);
        }
        assert!(StoreStatus::from_db("BOGUS").is_err());
    }
}

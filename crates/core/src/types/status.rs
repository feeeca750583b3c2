//! Roles and lifecycle statuses.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a role, status or decision string is not recognised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_owned(),
        }
    }
}

/// Role carried by a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages the roster and reviews timesheets.
    Admin,
    /// Logs hours against assigned subjects.
    #[default]
    Tutor,
}

impl Role {
    /// Returns true for [`Role::Admin`].
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Tutor => "tutor",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "tutor" => Ok(Self::Tutor),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Review status of a timesheet.
///
/// The only state machine in the system:
///
/// ```text
/// pending ──► approved
///    │
///    └──────► rejected
/// ```
///
/// Both `approved` and `rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "timesheet_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum TimesheetStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    /// Returns true once a decision has been recorded.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected)
        )
    }

    /// Lowercase name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TimesheetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimesheetStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseEnumError::new("timesheet status", s)),
        }
    }
}

/// An administrator's verdict on a pending timesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// Build a decision from the boolean used by review screens.
    #[must_use]
    pub const fn from_approved(approve: bool) -> Self {
        if approve { Self::Approve } else { Self::Reject }
    }

    /// The status a pending timesheet moves to under this decision.
    #[must_use]
    pub const fn target_status(self) -> TimesheetStatus {
        match self {
            Self::Approve => TimesheetStatus::Approved,
            Self::Reject => TimesheetStatus::Rejected,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in [Role::Admin, Role::Tutor] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn test_default_role_is_tutor() {
        assert_eq!(Role::default(), Role::Tutor);
        assert!(!Role::Tutor.is_admin());
        assert!(Role::Admin.is_admin());
    }

    #[test]
    fn test_only_pending_transitions() {
        use TimesheetStatus::{Approved, Pending, Rejected};

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));

        for terminal in [Approved, Rejected] {
            assert!(terminal.is_terminal());
            for next in [Pending, Approved, Rejected] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_decision_targets() {
        assert_eq!(
            Decision::from_approved(true).target_status(),
            TimesheetStatus::Approved
        );
        assert_eq!(
            Decision::from_approved(false).target_status(),
            TimesheetStatus::Rejected
        );
    }

    #[test]
    fn test_status_error_message() {
        let err = "done".parse::<TimesheetStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid timesheet status: done");
    }
}

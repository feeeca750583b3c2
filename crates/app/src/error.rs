//! Domain error taxonomy.
//!
//! Every service operation returns either its success value or a
//! [`DomainError`]. Backend failures are wrapped in [`StoreError`] or
//! [`IdentityError`]; raw `sqlx` or `reqwest` errors never cross this
//! boundary.

use chrono::NaiveDate;
use thiserror::Error;

use tutaville_core::{
    Email, EmailError, QuantityError, SubjectId, TimesheetId, TimesheetStatus, UserId,
};

use crate::identity::IdentityError;
use crate::store::StoreError;

/// Bad input shape or range. Raised before any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Hours or rate out of range.
    #[error(transparent)]
    Quantity(#[from] QuantityError),

    /// Malformed email address.
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    /// Hours can only be logged for today or earlier.
    #[error("date worked {0} is in the future")]
    FutureDate(NaiveDate),

    /// A required text field is empty after trimming.
    #[error("{field} cannot be empty")]
    Blank {
        /// Field name.
        field: &'static str,
    },

    /// A text field exceeds its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum allowed length.
        max: usize,
    },

    /// Phone numbers may contain digits, spaces and `+ - ( ) .` only.
    #[error("phone number contains invalid characters")]
    InvalidPhone,

    /// The same subject was listed twice in one assignment set.
    #[error("subject {0} appears more than once in the assignment set")]
    DuplicateSubject(SubjectId),

    /// A profile update that changes nothing.
    #[error("no fields to update")]
    EmptyUpdate,
}

/// Error returned by every domain service operation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Input failed validation; nothing was sent to the backend.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The tutor has no rate assignment for the subject.
    #[error("tutor {tutor_id} is not assigned to subject {subject_id}")]
    NotAssigned {
        /// Tutor who tried to log hours.
        tutor_id: UserId,
        /// Subject the hours were logged against.
        subject_id: SubjectId,
    },

    /// A subject with this name already exists (case-insensitive).
    #[error("a subject named {0:?} already exists")]
    DuplicateName(String),

    /// A profile or account with this email already exists.
    #[error("a user with email {0} already exists")]
    DuplicateEmail(Email),

    /// The timesheet was already approved or rejected.
    #[error("timesheet {id} was already {status}")]
    AlreadyDecided {
        /// Timesheet that was targeted.
        id: TimesheetId,
        /// Status recorded by the earlier decision.
        status: TimesheetStatus,
    },

    /// The identity account was created but its profile could not be written.
    ///
    /// This is the one outcome where state may be inconsistent: an account
    /// for `email` exists at the identity provider with id `user_id`, but the
    /// data store has no matching tutor profile.
    #[error("account {user_id} for {email} was created but its profile was not saved: {source}")]
    PartialInviteFailure {
        /// Account id issued by the identity provider.
        user_id: UserId,
        /// Invited address.
        email: Email,
        /// Why the profile write failed.
        #[source]
        source: StoreError,
    },

    /// Referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind ("subject", "tutor", "timesheet").
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Caller's role does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// No active session.
    #[error("not signed in")]
    Unauthenticated,

    /// Data store failure (retryable, opaque).
    #[error("data store error: {0}")]
    Store(#[from] StoreError),

    /// Identity provider failure (retryable, opaque).
    #[error("identity provider error: {0}")]
    Identity(#[from] IdentityError),
}

impl DomainError {
    /// Build a [`DomainError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether retrying the whole operation may succeed.
    ///
    /// Only backend failures qualify. A [`DomainError::PartialInviteFailure`]
    /// does not: a second invite reports `DuplicateEmail` at the identity
    /// provider instead of repairing the missing profile.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Identity(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Whether the operation may have left partial effects behind.
    ///
    /// `false` means "nothing happened"; `true` means "something happened and
    /// state may need manual reconciliation".
    #[must_use]
    pub const fn may_be_inconsistent(&self) -> bool {
        match self {
            Self::PartialInviteFailure { .. } => true,
            Self::Identity(e) => e.account_may_exist(),
            _ => false,
        }
    }
}

impl From<QuantityError> for DomainError {
    fn from(err: QuantityError) -> Self {
        Self::Validation(err.into())
    }
}

impl From<EmailError> for DomainError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.into())
    }
}

/// Trim `value` and enforce a non-empty, length-bounded field.
pub(crate) fn required_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Blank { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_owned())
}

/// Trim `value`, mapping blank input to `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => required_text(field, v, max).map(Some),
    }
}

/// Normalize an optional phone number.
pub(crate) fn optional_phone(value: Option<&str>) -> Result<Option<String>, ValidationError> {
    let phone = optional_text("phone", value, 32)?;
    if let Some(p) = &phone
        && !p
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')' | '.'))
    {
        return Err(ValidationError::InvalidPhone);
    }
    Ok(phone)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_trims() {
        assert_eq!(required_text("name", "  Maths ", 10), Ok("Maths".to_owned()));
        assert_eq!(
            required_text("name", "   ", 10),
            Err(ValidationError::Blank { field: "name" })
        );
        assert_eq!(
            required_text("name", "abcdefghijk", 10),
            Err(ValidationError::TooLong {
                field: "name",
                max: 10
            })
        );
    }

    #[test]
    fn test_optional_text_blank_is_none() {
        assert_eq!(optional_text("notes", Some("  "), 10), Ok(None));
        assert_eq!(optional_text("notes", None, 10), Ok(None));
        assert_eq!(optional_text("notes", Some(" hi "), 10), Ok(Some("hi".to_owned())));
    }

    #[test]
    fn test_optional_phone() {
        assert_eq!(
            optional_phone(Some("+1 (555) 010-2030")),
            Ok(Some("+1 (555) 010-2030".to_owned()))
        );
        assert_eq!(optional_phone(Some("call me")), Err(ValidationError::InvalidPhone));
        assert_eq!(optional_phone(Some("")), Ok(None));
    }

    #[test]
    fn test_retryable_and_inconsistent_flags() {
        assert!(DomainError::Store(StoreError::Timeout).is_retryable());
        assert!(!DomainError::Unauthenticated.is_retryable());
        assert!(!DomainError::Store(StoreError::Timeout).may_be_inconsistent());

        let partial = DomainError::PartialInviteFailure {
            user_id: UserId::generate(),
            email: Email::parse("new@tutor.org").unwrap(),
            source: StoreError::Timeout,
        };
        assert!(partial.may_be_inconsistent());
        assert!(!partial.is_retryable());

        let unread = DomainError::Identity(IdentityError::UnreadableAccount("eof".to_owned()));
        assert!(unread.may_be_inconsistent());
        assert!(!DomainError::Identity(IdentityError::Timeout).may_be_inconsistent());
    }

    #[test]
    fn test_quantity_errors_become_validation() {
        let err: DomainError = QuantityError::NonPositiveHours(rust_decimal::Decimal::ZERO).into();
        assert!(matches!(
            err,
            DomainError::Validation(ValidationError::Quantity(_))
        ));
    }
}

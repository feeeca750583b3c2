//! Profile domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutaville_core::{Email, Role, UserId};

/// A user's profile (domain type).
///
/// The id is the identity provider's user id, so there is exactly one
/// profile per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity-provider user id.
    pub id: UserId,
    /// Admin or tutor.
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Contact email, unique across profiles.
    pub email: Option<Email>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Human-readable name: "First Last", falling back to the email.
    ///
    /// Returns `None` when the profile carries neither.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if full.is_empty() {
            self.email.as_ref().map(ToString::to_string)
        } else {
            Some(full)
        }
    }
}

/// Values for creating (or overwriting) a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub id: UserId,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Email>,
    pub phone: Option<String>,
}

/// Partial update of a profile's contact fields.
///
/// `None` leaves a field untouched. For `phone`, `Some(None)` clears it.
/// Role and id are not part of this type and can never change through it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<Email>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<Option<String>>,
}

impl ProfileUpdate {
    /// Returns true if no field would change.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
    }

    /// Apply this update to an in-memory profile.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(first) = &self.first_name {
            profile.first_name = Some(first.clone());
        }
        if let Some(last) = &self.last_name {
            profile.last_name = Some(last.clone());
        }
        if let Some(email) = &self.email {
            profile.email = Some(email.clone());
        }
        if let Some(phone) = &self.phone {
            profile.phone.clone_from(phone);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn profile() -> Profile {
        Profile {
            id: UserId::generate(),
            role: Role::Tutor,
            first_name: Some("Alice".to_owned()),
            last_name: Some("Lovelace".to_owned()),
            email: Some(Email::parse("alice@example.com").unwrap()),
            phone: Some("555-0100".to_owned()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_prefers_full_name() {
        assert_eq!(profile().display_name().as_deref(), Some("Alice Lovelace"));
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        let mut p = profile();
        p.first_name = Some("  ".to_owned());
        p.last_name = None;
        assert_eq!(p.display_name().as_deref(), Some("alice@example.com"));

        p.email = None;
        assert_eq!(p.display_name(), None);
    }

    #[test]
    fn test_apply_update_touches_only_given_fields() {
        let mut p = profile();
        let update = ProfileUpdate {
            last_name: Some("Byron".to_owned()),
            phone: Some(None),
            ..ProfileUpdate::default()
        };
        update.apply_to(&mut p);

        assert_eq!(p.first_name.as_deref(), Some("Alice"));
        assert_eq!(p.last_name.as_deref(), Some("Byron"));
        assert_eq!(p.phone, None);
        assert_eq!(p.role, Role::Tutor);
    }
}

//! Subject domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutaville_core::SubjectId;

/// A subject tutors can be assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    /// Unique, compared case-insensitively.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    /// Key used for case-insensitive name comparison.
    #[must_use]
    pub fn name_key(name: &str) -> String {
        name.trim().to_lowercase()
    }
}

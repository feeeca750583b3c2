//! Tutor-subject rate bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tutaville_core::{HourlyRate, SubjectId, UserId};

/// A tutor's rate for one subject. Identity is `(tutor_id, subject_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorAssignment {
    pub tutor_id: UserId,
    pub subject_id: SubjectId,
    pub rate_per_hour: HourlyRate,
    pub assigned_at: DateTime<Utc>,
}

/// One element of the desired assignment set passed to `set_assignments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDraft {
    pub subject_id: SubjectId,
    pub rate_per_hour: HourlyRate,
}

/// An assignment joined with its subject's name, as shown to the tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedSubject {
    pub subject_id: SubjectId,
    pub subject_name: String,
    pub rate_per_hour: HourlyRate,
    pub assigned_at: DateTime<Utc>,
}

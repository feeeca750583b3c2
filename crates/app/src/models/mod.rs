//! Domain models.
//!
//! These types represent validated entities and the read projections built
//! from them. Row types used for decoding live next to the queries in
//! [`crate::db`]; these are what the services hand back to callers.

pub mod assignment;
pub mod profile;
pub mod subject;
pub mod timesheet;

pub use assignment::{AssignedSubject, AssignmentDraft, TutorAssignment};
pub use profile::{NewProfile, Profile, ProfileUpdate};
pub use subject::Subject;
pub use timesheet::{
    DecisionRecord, NewTimesheet, Timesheet, TimesheetEntry, TimesheetFilter,
    TimesheetSubmission,
};

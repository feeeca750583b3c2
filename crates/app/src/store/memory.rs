//! In-memory [`DataStore`].
//!
//! Holds every table behind one async mutex, so each call sees and leaves a
//! consistent snapshot. Constraint checks mirror the migrations: unique
//! lower-cased profile email and subject name, and foreign keys from
//! assignments and timesheets.
//!
//! Tests can count calls per operation and inject a one-shot failure into
//! the next call of a given operation.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use tutaville_core::{Email, Role, SubjectId, TimesheetId, TimesheetStatus, UserId};

use super::{
    CascadePlan, CascadeReport, CascadeStep, DataStore, PROFILES_EMAIL_KEY, SUBJECTS_NAME_KEY,
    StoreError,
};
use crate::models::{
    AssignedSubject, AssignmentDraft, DecisionRecord, NewProfile, NewTimesheet, Profile,
    ProfileUpdate, Subject, Timesheet, TimesheetEntry, TimesheetFilter, TutorAssignment,
};

/// Operations of [`DataStore`], for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Profile,
    ProfileByEmail,
    ProfilesWithRole,
    UpsertProfile,
    UpdateProfile,
    SetRole,
    Subjects,
    Subject,
    SubjectByName,
    InsertSubject,
    Assignment,
    AssignmentsForTutor,
    ReplaceAssignments,
    InsertTimesheet,
    Timesheet,
    ListTimesheets,
    DecideIfPending,
    Execute,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    profiles: HashMap<UserId, Profile>,
    subjects: HashMap<SubjectId, Subject>,
    assignments: BTreeMap<(UserId, SubjectId), TutorAssignment>,
    /// Insertion sequence alongside each row, used as the final sort key.
    timesheets: HashMap<TimesheetId, (u64, Timesheet)>,
    next_seq: u64,
}

#[derive(Debug, Default)]
struct State {
    tables: Tables,
    calls: HashMap<StoreOp, usize>,
    failures: HashMap<StoreOp, StoreError>,
}

/// A [`DataStore`] backed by in-process tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `err`.
    pub async fn fail_next(&self, op: StoreOp, err: StoreError) {
        self.state.lock().await.failures.insert(op, err);
    }

    /// Number of calls made to `op` so far.
    pub async fn calls_to(&self, op: StoreOp) -> usize {
        self.state.lock().await.calls.get(&op).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation so far.
    pub async fn total_calls(&self) -> usize {
        self.state.lock().await.calls.values().sum()
    }

    /// Number of assignment rows referencing `subject_id`.
    pub async fn assignment_count_for_subject(&self, subject_id: SubjectId) -> usize {
        self.state
            .lock()
            .await
            .tables
            .assignments
            .keys()
            .filter(|(_, s)| *s == subject_id)
            .count()
    }

    async fn enter(&self, op: StoreOp) -> Result<MutexGuard<'_, State>, StoreError> {
        let mut state = self.state.lock().await;
        *state.calls.entry(op).or_default() += 1;
        if let Some(err) = state.failures.remove(&op) {
            return Err(err);
        }
        Ok(state)
    }
}

impl Tables {
    fn email_taken(&self, email: Option<&Email>, except: UserId) -> bool {
        email.is_some_and(|email| {
            self.profiles
                .values()
                .any(|p| p.id != except && p.email.as_ref() == Some(email))
        })
    }

    fn entry_for(&self, timesheet: &Timesheet) -> TimesheetEntry {
        let tutor_name = timesheet
            .tutor_id
            .and_then(|id| self.profiles.get(&id))
            .and_then(Profile::display_name)
            .unwrap_or_else(|| timesheet.tutor_name.clone());
        let subject_name = timesheet
            .subject_id
            .and_then(|id| self.subjects.get(&id))
            .map_or_else(|| timesheet.subject_name.clone(), |s| s.name.clone());
        let rate_per_hour = timesheet
            .tutor_id
            .zip(timesheet.subject_id)
            .and_then(|key| self.assignments.get(&key))
            .map(|a| a.rate_per_hour);

        TimesheetEntry {
            timesheet: timesheet.clone(),
            tutor_name,
            subject_name,
            rate_per_hour,
        }
    }

    fn apply(&mut self, step: CascadeStep) -> u64 {
        let now = Utc::now();
        let count = match step {
            CascadeStep::DeleteAssignmentsForSubject(id) => {
                let before = self.assignments.len();
                self.assignments.retain(|(_, s), _| *s != id);
                before - self.assignments.len()
            }
            CascadeStep::DeleteAssignmentsForTutor(id) => {
                let before = self.assignments.len();
                self.assignments.retain(|(t, _), _| *t != id);
                before - self.assignments.len()
            }
            CascadeStep::DetachTimesheetsFromSubject(id) => {
                let name = self.subjects.get(&id).map(|s| s.name.clone());
                let mut count = 0;
                for (_, ts) in self.timesheets.values_mut() {
                    if ts.subject_id == Some(id) {
                        ts.subject_id = None;
                        if let Some(name) = &name {
                            ts.subject_name.clone_from(name);
                        }
                        ts.updated_at = now;
                        count += 1;
                    }
                }
                count
            }
            CascadeStep::DetachTimesheetsFromTutor(id) => {
                let name = self.profiles.get(&id).and_then(Profile::display_name);
                let mut count = 0;
                for (_, ts) in self.timesheets.values_mut() {
                    if ts.tutor_id == Some(id) {
                        ts.tutor_id = None;
                        if let Some(name) = &name {
                            ts.tutor_name.clone_from(name);
                        }
                        ts.updated_at = now;
                        count += 1;
                    }
                }
                count
            }
            CascadeStep::DeleteSubject(id) => usize::from(self.subjects.remove(&id).is_some()),
            CascadeStep::DeleteProfile(id) => usize::from(self.profiles.remove(&id).is_some()),
        };
        count as u64
    }
}

fn foreign_key(constraint: &str) -> StoreError {
    StoreError::ForeignKey {
        constraint: constraint.to_owned(),
    }
}

fn conflict(constraint: &str) -> StoreError {
    StoreError::Conflict {
        constraint: constraint.to_owned(),
    }
}

impl DataStore for MemoryStore {
    async fn profile(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        let state = self.enter(StoreOp::Profile).await?;
        Ok(state.tables.profiles.get(&id).cloned())
    }

    async fn profile_by_email(&self, email: &Email) -> Result<Option<Profile>, StoreError> {
        let state = self.enter(StoreOp::ProfileByEmail).await?;
        Ok(state
            .tables
            .profiles
            .values()
            .find(|p| p.email.as_ref() == Some(email))
            .cloned())
    }

    async fn profiles_with_role(&self, role: Role) -> Result<Vec<Profile>, StoreError> {
        let state = self.enter(StoreOp::ProfilesWithRole).await?;
        let mut profiles: Vec<Profile> = state
            .tables
            .profiles
            .values()
            .filter(|p| p.role == role)
            .cloned()
            .collect();
        profiles.sort_by(|a, b| {
            (a.last_name.is_none(), &a.last_name, a.first_name.is_none(), &a.first_name, &a.email)
                .cmp(&(
                    b.last_name.is_none(),
                    &b.last_name,
                    b.first_name.is_none(),
                    &b.first_name,
                    &b.email,
                ))
        });
        Ok(profiles)
    }

    async fn upsert_profile(&self, profile: &NewProfile) -> Result<Profile, StoreError> {
        let mut state = self.enter(StoreOp::UpsertProfile).await?;
        let tables = &mut state.tables;
        if tables.email_taken(profile.email.as_ref(), profile.id) {
            return Err(conflict(PROFILES_EMAIL_KEY));
        }

        let now = Utc::now();
        let created_at = tables
            .profiles
            .get(&profile.id)
            .map_or(now, |existing| existing.created_at);
        let stored = Profile {
            id: profile.id,
            role: profile.role,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            created_at,
            updated_at: now,
        };
        tables.profiles.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: &ProfileUpdate,
    ) -> Result<Option<Profile>, StoreError> {
        let mut state = self.enter(StoreOp::UpdateProfile).await?;
        let tables = &mut state.tables;
        if tables.email_taken(update.email.as_ref(), id) {
            return Err(conflict(PROFILES_EMAIL_KEY));
        }
        let Some(profile) = tables.profiles.get_mut(&id) else {
            return Ok(None);
        };
        update.apply_to(profile);
        profile.updated_at = Utc::now();
        Ok(Some(profile.clone()))
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<Option<Profile>, StoreError> {
        let mut state = self.enter(StoreOp::SetRole).await?;
        Ok(state.tables.profiles.get_mut(&id).map(|profile| {
            profile.role = role;
            profile.updated_at = Utc::now();
            profile.clone()
        }))
    }

    async fn subjects(&self) -> Result<Vec<Subject>, StoreError> {
        let state = self.enter(StoreOp::Subjects).await?;
        let mut subjects: Vec<Subject> = state.tables.subjects.values().cloned().collect();
        subjects.sort_by_cached_key(|s| Subject::name_key(&s.name));
        Ok(subjects)
    }

    async fn subject(&self, id: SubjectId) -> Result<Option<Subject>, StoreError> {
        let state = self.enter(StoreOp::Subject).await?;
        Ok(state.tables.subjects.get(&id).cloned())
    }

    async fn subject_by_name(&self, name: &str) -> Result<Option<Subject>, StoreError> {
        let state = self.enter(StoreOp::SubjectByName).await?;
        let key = Subject::name_key(name);
        Ok(state
            .tables
            .subjects
            .values()
            .find(|s| Subject::name_key(&s.name) == key)
            .cloned())
    }

    async fn insert_subject(&self, name: &str) -> Result<Subject, StoreError> {
        let mut state = self.enter(StoreOp::InsertSubject).await?;
        let key = Subject::name_key(name);
        if state
            .tables
            .subjects
            .values()
            .any(|s| Subject::name_key(&s.name) == key)
        {
            return Err(conflict(SUBJECTS_NAME_KEY));
        }
        let subject = Subject {
            id: SubjectId::generate(),
            name: name.trim().to_owned(),
            created_at: Utc::now(),
        };
        state.tables.subjects.insert(subject.id, subject.clone());
        Ok(subject)
    }

    async fn assignment(
        &self,
        tutor_id: UserId,
        subject_id: SubjectId,
    ) -> Result<Option<TutorAssignment>, StoreError> {
        let state = self.enter(StoreOp::Assignment).await?;
        Ok(state.tables.assignments.get(&(tutor_id, subject_id)).cloned())
    }

    async fn assignments_for_tutor(
        &self,
        tutor_id: UserId,
    ) -> Result<Vec<AssignedSubject>, StoreError> {
        let state = self.enter(StoreOp::AssignmentsForTutor).await?;
        let tables = &state.tables;
        let mut assigned: Vec<AssignedSubject> = tables
            .assignments
            .values()
            .filter(|a| a.tutor_id == tutor_id)
            .filter_map(|a| {
                tables.subjects.get(&a.subject_id).map(|s| AssignedSubject {
                    subject_id: a.subject_id,
                    subject_name: s.name.clone(),
                    rate_per_hour: a.rate_per_hour,
                    assigned_at: a.assigned_at,
                })
            })
            .collect();
        assigned.sort_by_cached_key(|a| Subject::name_key(&a.subject_name));
        Ok(assigned)
    }

    async fn replace_assignments(
        &self,
        tutor_id: UserId,
        desired: &[AssignmentDraft],
    ) -> Result<Vec<TutorAssignment>, StoreError> {
        let mut state = self.enter(StoreOp::ReplaceAssignments).await?;
        let tables = &mut state.tables;

        if !tables.profiles.contains_key(&tutor_id) {
            return Err(foreign_key("tutor_subjects_tutor_id_fkey"));
        }
        let mut seen = Vec::with_capacity(desired.len());
        for draft in desired {
            if !tables.subjects.contains_key(&draft.subject_id) {
                return Err(foreign_key("tutor_subjects_subject_id_fkey"));
            }
            if seen.contains(&draft.subject_id) {
                return Err(conflict("tutor_subjects_pkey"));
            }
            seen.push(draft.subject_id);
        }

        tables.assignments.retain(|(t, _), _| *t != tutor_id);
        let now = Utc::now();
        let inserted: Vec<TutorAssignment> = desired
            .iter()
            .map(|draft| TutorAssignment {
                tutor_id,
                subject_id: draft.subject_id,
                rate_per_hour: draft.rate_per_hour,
                assigned_at: now,
            })
            .collect();
        for assignment in &inserted {
            tables
                .assignments
                .insert((tutor_id, assignment.subject_id), assignment.clone());
        }
        Ok(inserted)
    }

    async fn insert_timesheet(&self, new: &NewTimesheet) -> Result<Timesheet, StoreError> {
        let mut state = self.enter(StoreOp::InsertTimesheet).await?;
        let tables = &mut state.tables;
        if !tables.profiles.contains_key(&new.tutor_id) {
            return Err(foreign_key("timesheets_tutor_id_fkey"));
        }
        if !tables.subjects.contains_key(&new.subject_id) {
            return Err(foreign_key("timesheets_subject_id_fkey"));
        }

        let now = Utc::now();
        let timesheet = Timesheet {
            id: TimesheetId::generate(),
            tutor_id: Some(new.tutor_id),
            subject_id: Some(new.subject_id),
            tutor_name: new.tutor_name.clone(),
            subject_name: new.subject_name.clone(),
            hours_worked: new.hours_worked,
            date_worked: new.date_worked,
            notes: new.notes.clone(),
            status: TimesheetStatus::Pending,
            approved_by: None,
            approval_date: None,
            created_at: now,
            updated_at: now,
        };
        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables
            .timesheets
            .insert(timesheet.id, (seq, timesheet.clone()));
        Ok(timesheet)
    }

    async fn timesheet(&self, id: TimesheetId) -> Result<Option<Timesheet>, StoreError> {
        let state = self.enter(StoreOp::Timesheet).await?;
        Ok(state.tables.timesheets.get(&id).map(|(_, ts)| ts.clone()))
    }

    async fn list_timesheets(
        &self,
        filter: &TimesheetFilter,
    ) -> Result<Vec<TimesheetEntry>, StoreError> {
        let state = self.enter(StoreOp::ListTimesheets).await?;
        let tables = &state.tables;
        let mut rows: Vec<&(u64, Timesheet)> = tables
            .timesheets
            .values()
            .filter(|(_, ts)| filter.matches(ts))
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            (b.date_worked, b.created_at, seq_b).cmp(&(a.date_worked, a.created_at, seq_a))
        });
        Ok(rows.into_iter().map(|(_, ts)| tables.entry_for(ts)).collect())
    }

    async fn decide_if_pending(
        &self,
        id: TimesheetId,
        decision: &DecisionRecord,
    ) -> Result<Option<Timesheet>, StoreError> {
        let mut state = self.enter(StoreOp::DecideIfPending).await?;
        let Some((_, timesheet)) = state.tables.timesheets.get_mut(&id) else {
            return Ok(None);
        };
        if timesheet.status != TimesheetStatus::Pending {
            return Ok(None);
        }
        decision.apply_to(timesheet, Utc::now());
        Ok(Some(timesheet.clone()))
    }

    async fn execute(&self, plan: &CascadePlan) -> Result<CascadeReport, StoreError> {
        let mut state = self.enter(StoreOp::Execute).await?;
        let mut staged = state.tables.clone();
        let mut report = CascadeReport::default();
        for step in plan.steps() {
            report.record(*step, staged.apply(*step));
        }
        state.tables = staged;
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use tutaville_core::{HourlyRate, Hours};

    use super::*;

    fn tutor(first: &str, email: &str) -> NewProfile {
        NewProfile {
            id: UserId::generate(),
            role: Role::Tutor,
            first_name: Some(first.to_owned()),
            last_name: None,
            email: Some(Email::parse(email).unwrap()),
            phone: None,
        }
    }

    fn rate(value: i64) -> HourlyRate {
        HourlyRate::new(Decimal::from(value)).unwrap()
    }

    fn new_timesheet(tutor: UserId, subject: SubjectId, day: u32) -> NewTimesheet {
        NewTimesheet {
            tutor_id: tutor,
            subject_id: subject,
            tutor_name: "Alice".to_owned(),
            subject_name: "Math".to_owned(),
            hours_worked: Hours::new(Decimal::from(2)).unwrap(),
            date_worked: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_email_uniqueness_is_enforced() {
        let store = MemoryStore::new();
        store.upsert_profile(&tutor("Alice", "alice@x.org")).await.unwrap();

        let err = store
            .upsert_profile(&tutor("Other", "ALICE@x.org"))
            .await
            .unwrap_err();
        assert!(err.is_conflict_on(PROFILES_EMAIL_KEY));
    }

    #[tokio::test]
    async fn test_subject_names_unique_ignoring_case() {
        let store = MemoryStore::new();
        store.insert_subject("Math").await.unwrap();
        let err = store.insert_subject(" math ").await.unwrap_err();
        assert!(err.is_conflict_on(SUBJECTS_NAME_KEY));
        assert!(store.subject_by_name("MATH").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Subjects, StoreError::Timeout).await;

        assert!(matches!(store.subjects().await, Err(StoreError::Timeout)));
        assert!(store.subjects().await.is_ok());
        assert_eq!(store.calls_to(StoreOp::Subjects).await, 2);
    }

    #[tokio::test]
    async fn test_decide_if_pending_only_once() {
        let store = MemoryStore::new();
        let alice = store.upsert_profile(&tutor("Alice", "alice@x.org")).await.unwrap();
        let math = store.insert_subject("Math").await.unwrap();
        let ts = store
            .insert_timesheet(&new_timesheet(alice.id, math.id, 10))
            .await
            .unwrap();

        let admin = UserId::generate();
        let approve = DecisionRecord::new(tutaville_core::Decision::Approve, admin, Utc::now());
        let reject = DecisionRecord::new(tutaville_core::Decision::Reject, admin, Utc::now());

        assert!(store.decide_if_pending(ts.id, &approve).await.unwrap().is_some());
        assert!(store.decide_if_pending(ts.id, &reject).await.unwrap().is_none());
        let stored = store.timesheet(ts.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TimesheetStatus::Approved);
    }

    #[tokio::test]
    async fn test_list_orders_by_date_then_creation() {
        let store = MemoryStore::new();
        let alice = store.upsert_profile(&tutor("Alice", "alice@x.org")).await.unwrap();
        let math = store.insert_subject("Math").await.unwrap();

        let first = store.insert_timesheet(&new_timesheet(alice.id, math.id, 5)).await.unwrap();
        let second = store.insert_timesheet(&new_timesheet(alice.id, math.id, 9)).await.unwrap();
        let third = store.insert_timesheet(&new_timesheet(alice.id, math.id, 5)).await.unwrap();

        let ids: Vec<TimesheetId> = store
            .list_timesheets(&TimesheetFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.timesheet.id)
            .collect();
        assert_eq!(ids, vec![second.id, third.id, first.id]);
    }

    #[tokio::test]
    async fn test_delete_tutor_plan_detaches_timesheets() {
        let store = MemoryStore::new();
        let alice = store.upsert_profile(&tutor("Alice", "alice@x.org")).await.unwrap();
        let math = store.insert_subject("Math").await.unwrap();
        store
            .replace_assignments(
                alice.id,
                &[AssignmentDraft {
                    subject_id: math.id,
                    rate_per_hour: rate(50),
                }],
            )
            .await
            .unwrap();
        let ts = store
            .insert_timesheet(&new_timesheet(alice.id, math.id, 10))
            .await
            .unwrap();

        let report = store.execute(&CascadePlan::delete_tutor(alice.id)).await.unwrap();
        assert!(report.root_deleted());

        let kept = store.timesheet(ts.id).await.unwrap().unwrap();
        assert_eq!(kept.tutor_id, None);
        assert_eq!(kept.tutor_name, "Alice");
        assert_eq!(kept.subject_id, Some(math.id));
        assert!(store.assignment(alice.id, math.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_plan_changes_nothing() {
        let store = MemoryStore::new();
        let math = store.insert_subject("Math").await.unwrap();
        store
            .fail_next(StoreOp::Execute, StoreError::Unavailable("down".to_owned()))
            .await;

        assert!(store.execute(&CascadePlan::delete_subject(math.id)).await.is_err());
        assert!(store.subject(math.id).await.unwrap().is_some());
    }
}

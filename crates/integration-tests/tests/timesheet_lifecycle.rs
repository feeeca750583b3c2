//! Timesheet lifecycle, from invitation through review, against the
//! in-memory store and identity provider.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tutaville_app::DomainError;
use tutaville_app::models::{TimesheetFilter, TimesheetSubmission};
use tutaville_app::services::{DesiredRate, TutorInvite};
use tutaville_core::{Decision, Role, TimesheetStatus};
use tutaville_integration_tests::World;

fn alice_invite() -> TutorInvite {
    TutorInvite {
        email: "alice@tutaville.test".to_owned(),
        first_name: "Alice".to_owned(),
        last_name: "Liddell".to_owned(),
        phone: None,
    }
}

fn jan_10() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
}

#[tokio::test]
async fn test_alice_math_end_to_end() {
    let world = World::new().await;
    let roster = world.roster();
    let timesheets = world.timesheets();

    // Admin sets up the roster
    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    let invited = roster.invite_tutor(&world.admin, &alice_invite()).await.unwrap();
    roster
        .set_assignments(
            &world.admin,
            invited.profile.id,
            &[DesiredRate {
                subject_id: math.id,
                rate_per_hour: Decimal::from(50),
            }],
        )
        .await
        .unwrap();

    // Alice signs in and logs three hours
    let alice = world.sign_in("alice@tutaville.test").await;
    assert_eq!(alice.user_id, invited.profile.id);
    assert_eq!(alice.role, Role::Tutor);

    let submitted = timesheets
        .submit(
            &alice,
            TimesheetSubmission {
                tutor_id: alice.user_id,
                subject_id: math.id,
                hours_worked: Decimal::from(3),
                date_worked: jan_10(),
                notes: Some("Algebra revision".to_owned()),
            },
        )
        .await
        .unwrap();
    assert_eq!(submitted.status, TimesheetStatus::Pending);

    // It shows up in the admin's review queue
    let queue = timesheets.pending_queue(&world.admin).await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].timesheet.id, submitted.id);

    // Admin approves
    let approved = timesheets
        .decide(&world.admin, submitted.id, Decision::Approve)
        .await
        .unwrap();
    assert_eq!(approved.status, TimesheetStatus::Approved);
    assert_eq!(approved.approved_by, Some(world.admin.user_id));
    assert!(approved.approval_date.is_some());

    // Alice's history shows one approved 3-hour Math entry on the stored date
    let history = timesheets
        .list(&alice, TimesheetFilter::for_tutor(alice.user_id))
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let entry = &history[0];
    assert_eq!(entry.timesheet.status, TimesheetStatus::Approved);
    assert_eq!(entry.timesheet.hours_worked.get(), Decimal::from(3));
    assert_eq!(entry.timesheet.date_worked, jan_10());
    assert_eq!(entry.subject_name, "Math");
    assert_eq!(entry.tutor_name, "Alice Liddell");
    assert_eq!(entry.amount(), Some(Decimal::from(150)));

    assert!(timesheets.pending_queue(&world.admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_timesheet_cannot_be_approved_later() {
    let world = World::new().await;
    let roster = world.roster();
    let timesheets = world.timesheets();

    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    let invited = roster.invite_tutor(&world.admin, &alice_invite()).await.unwrap();
    roster
        .set_assignments(
            &world.admin,
            invited.profile.id,
            &[DesiredRate {
                subject_id: math.id,
                rate_per_hour: Decimal::from(50),
            }],
        )
        .await
        .unwrap();
    let alice = world.sign_in("alice@tutaville.test").await;

    let ts = timesheets
        .submit(
            &alice,
            TimesheetSubmission {
                tutor_id: alice.user_id,
                subject_id: math.id,
                hours_worked: Decimal::new(15, 1),
                date_worked: jan_10(),
                notes: None,
            },
        )
        .await
        .unwrap();

    timesheets
        .decide(&world.admin, ts.id, Decision::Reject)
        .await
        .unwrap();
    let err = timesheets
        .decide(&world.admin, ts.id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::AlreadyDecided {
            status: TimesheetStatus::Rejected,
            ..
        }
    ));

    // Tutors cannot review, even their own rows
    let err = timesheets
        .decide(&alice, ts.id, Decision::Approve)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_)));
}

#[tokio::test]
async fn test_rate_change_is_reflected_in_listing() {
    let world = World::new().await;
    let roster = world.roster();
    let timesheets = world.timesheets();

    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    let invited = roster.invite_tutor(&world.admin, &alice_invite()).await.unwrap();
    let set_rate = |rate: i64| DesiredRate {
        subject_id: math.id,
        rate_per_hour: Decimal::from(rate),
    };
    roster
        .set_assignments(&world.admin, invited.profile.id, &[set_rate(50)])
        .await
        .unwrap();
    let alice = world.sign_in("alice@tutaville.test").await;
    timesheets
        .submit(
            &alice,
            TimesheetSubmission {
                tutor_id: alice.user_id,
                subject_id: math.id,
                hours_worked: Decimal::from(2),
                date_worked: jan_10(),
                notes: None,
            },
        )
        .await
        .unwrap();

    roster
        .set_assignments(&world.admin, invited.profile.id, &[set_rate(60)])
        .await
        .unwrap();

    let listed = timesheets
        .list(&world.admin, TimesheetFilter::default())
        .await
        .unwrap();
    assert_eq!(listed[0].amount(), Some(Decimal::from(120)));
    assert_eq!(
        timesheets
            .rate_for(&alice, alice.user_id, math.id)
            .await
            .unwrap()
            .get(),
        Decimal::from(60)
    );
}

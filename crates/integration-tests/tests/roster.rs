//! Roster management against the in-memory store and identity provider.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tutaville_app::DomainError;
use tutaville_app::identity::Delivery;
use tutaville_app::models::{ProfileUpdate, TimesheetFilter, TimesheetSubmission};
use tutaville_app::services::{DesiredRate, InviteDelivery, TutorInvite};
use tutaville_app::store::DataStore;
use tutaville_core::{Email, Role};
use tutaville_integration_tests::World;

fn invite(email: &str, first: &str) -> TutorInvite {
    TutorInvite {
        email: email.to_owned(),
        first_name: first.to_owned(),
        last_name: "Tutor".to_owned(),
        phone: Some("+44 20 7946 0000".to_owned()),
    }
}

fn rate(subject_id: tutaville_core::SubjectId, amount: i64) -> DesiredRate {
    DesiredRate {
        subject_id,
        rate_per_hour: Decimal::from(amount),
    }
}

#[tokio::test]
async fn test_replacing_assignments_drops_old_subjects() {
    let world = World::new().await;
    let roster = world.roster();
    let a = roster.add_subject(&world.admin, "Algebra").await.unwrap();
    let b = roster.add_subject(&world.admin, "Biology").await.unwrap();
    let tutor = roster
        .invite_tutor(&world.admin, &invite("tom@tutaville.test", "Tom"))
        .await
        .unwrap()
        .profile;

    roster
        .set_assignments(&world.admin, tutor.id, &[rate(a.id, 100), rate(b.id, 200)])
        .await
        .unwrap();
    roster
        .set_assignments(&world.admin, tutor.id, &[rate(b.id, 150)])
        .await
        .unwrap();

    let rows = world.store.assignments_for_tutor(tutor.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].subject_id, b.id);
    assert_eq!(rows[0].rate_per_hour.get(), Decimal::from(150));
}

#[tokio::test]
async fn test_inviting_twice_keeps_one_profile() {
    let world = World::new().await;
    let roster = world.roster();

    roster
        .invite_tutor(&world.admin, &invite("tom@tutaville.test", "Tom"))
        .await
        .unwrap();
    let err = roster
        .invite_tutor(&world.admin, &invite("TOM@tutaville.test", "Thomas"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::DuplicateEmail(_)));
    assert!(!err.may_be_inconsistent());

    let tutors = roster.list_tutors(&world.admin).await.unwrap();
    let toms: Vec<_> = tutors
        .iter()
        .filter(|p| p.email.as_ref().map(Email::as_str) == Some("tom@tutaville.test"))
        .collect();
    assert_eq!(toms.len(), 1);
    assert_eq!(toms[0].first_name.as_deref(), Some("Tom"));
}

#[tokio::test]
async fn test_invite_without_invitation_support() {
    let world = World::new().await;
    world.identity.set_invites_supported(false).await;

    let pending = world
        .roster()
        .invite_tutor(&world.admin, &invite("una@tutaville.test", "Una"))
        .await
        .unwrap();
    assert_eq!(
        pending.delivery,
        InviteDelivery::TemporaryPassword {
            recovery_sent: true
        }
    );
    assert_eq!(
        world.identity.deliveries().await,
        vec![Delivery::PasswordRecovery(
            Email::parse("una@tutaville.test").unwrap()
        )]
    );

    let una = world.sign_in("una@tutaville.test").await;
    assert_eq!(una.user_id, pending.profile.id);
    assert_eq!(una.role, Role::Tutor);
}

#[tokio::test]
async fn test_deleting_tutor_keeps_history() {
    let world = World::new().await;
    let roster = world.roster();
    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    let tom = roster
        .invite_tutor(&world.admin, &invite("tom@tutaville.test", "Tom"))
        .await
        .unwrap()
        .profile;
    roster
        .set_assignments(&world.admin, tom.id, &[rate(math.id, 40)])
        .await
        .unwrap();
    let tom_ctx = world.sign_in("tom@tutaville.test").await;
    let ts = world
        .timesheets()
        .submit(
            &tom_ctx,
            TimesheetSubmission {
                tutor_id: tom.id,
                subject_id: math.id,
                hours_worked: Decimal::from(2),
                date_worked: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                notes: None,
            },
        )
        .await
        .unwrap();

    // Rename first so the detach step records the latest name
    roster
        .update_tutor(
            &tom_ctx,
            tom.id,
            ProfileUpdate {
                first_name: Some("Thomas".to_owned()),
                ..ProfileUpdate::default()
            },
        )
        .await
        .unwrap();
    roster.delete_tutor(&world.admin, tom.id).await.unwrap();

    let all = world
        .timesheets()
        .list(&world.admin, TimesheetFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].timesheet.id, ts.id);
    assert_eq!(all[0].timesheet.tutor_id, None);
    assert_eq!(all[0].tutor_name, "Thomas Tutor");
    assert_eq!(all[0].rate_per_hour, None);
    assert!(roster.list_tutors(&world.admin).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_subject_removes_assignments() {
    let world = World::new().await;
    let roster = world.roster();
    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    for (email, first) in [("a@tutaville.test", "Ann"), ("b@tutaville.test", "Ben")] {
        let tutor = roster
            .invite_tutor(&world.admin, &invite(email, first))
            .await
            .unwrap()
            .profile;
        roster
            .set_assignments(&world.admin, tutor.id, &[rate(math.id, 30)])
            .await
            .unwrap();
    }
    assert_eq!(world.store.assignment_count_for_subject(math.id).await, 2);

    roster.delete_subject(&world.admin, math.id).await.unwrap();

    assert_eq!(world.store.assignment_count_for_subject(math.id).await, 0);
    assert!(roster.list_subjects(&world.admin).await.unwrap().is_empty());
    // The name is free again
    roster.add_subject(&world.admin, "math").await.unwrap();
}

#[tokio::test]
async fn test_tutor_sees_only_own_assignments() {
    let world = World::new().await;
    let roster = world.roster();
    let math = roster.add_subject(&world.admin, "Math").await.unwrap();
    let ann = roster
        .invite_tutor(&world.admin, &invite("a@tutaville.test", "Ann"))
        .await
        .unwrap()
        .profile;
    let ben = roster
        .invite_tutor(&world.admin, &invite("b@tutaville.test", "Ben"))
        .await
        .unwrap()
        .profile;
    roster
        .set_assignments(&world.admin, ann.id, &[rate(math.id, 30)])
        .await
        .unwrap();

    let ben_ctx = world.sign_in("b@tutaville.test").await;
    assert!(roster.assignments_for(&ben_ctx, ben.id).await.unwrap().is_empty());
    assert!(matches!(
        roster.assignments_for(&ben_ctx, ann.id).await,
        Err(DomainError::Forbidden(_))
    ));
    assert!(matches!(
        roster.list_tutors(&ben_ctx).await,
        Err(DomainError::Forbidden(_))
    ));
}

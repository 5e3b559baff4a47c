mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use curate_moderation::{ModerationError, ModerationService, WriteOutcome};
use curate_notify::{query_outbox, OutboxFilter};
use curate_types::{Actor, ModerationStatus, NotificationEvent, SubjectRef};

use common::{file_pool, post, registry};

#[test]
fn test_concurrent_approve_and_reject_have_one_winner() {
    for round in 0..10 {
        let (_dir, pool) = file_pool();
        let service = Arc::new(ModerationService::with_sqlite_store(pool, registry()));
        let subject = SubjectRef::new("post", format!("race-{round}"));
        service
            .save_entity(&subject, post("Race", "body"), None)
            .expect("create should succeed");

        let barrier = Arc::new(Barrier::new(2));
        let approver = {
            let (service, barrier, subject) =
                (Arc::clone(&service), Arc::clone(&barrier), subject.clone());
            thread::spawn(move || {
                barrier.wait();
                service.approve(&subject, "mod-a", None)
            })
        };
        let rejecter = {
            let (service, barrier, subject) =
                (Arc::clone(&service), Arc::clone(&barrier), subject.clone());
            thread::spawn(move || {
                barrier.wait();
                service.reject(&subject, "mod-b", None)
            })
        };

        let approved = approver.join().expect("approver panicked");
        let rejected = rejecter.join().expect("rejecter panicked");

        let winner = match (&approved, &rejected) {
            (Ok(record), Err(ModerationError::InvalidTransition { .. })) => {
                assert_eq!(record.status, ModerationStatus::Approved);
                NotificationEvent::UserApproved
            }
            (Err(ModerationError::InvalidTransition { .. }), Ok(record)) => {
                assert_eq!(record.status, ModerationStatus::Rejected);
                NotificationEvent::UserRejected
            }
            other => panic!("expected exactly one winner, got {other:?}"),
        };

        let conn = service.pool().get().unwrap();
        let decisions: Vec<NotificationEvent> = query_outbox(
            &conn,
            &OutboxFilter {
                object_pk: Some(subject.object_pk.clone()),
                ..Default::default()
            },
        )
        .unwrap()
        .into_iter()
        .map(|entry| entry.notification.event)
        .filter(|event| *event != NotificationEvent::ModeratorPending)
        .collect();
        assert_eq!(decisions, vec![winner]);
    }
}

#[test]
fn test_edit_racing_approve_never_publishes_unreviewed_values() {
    for round in 0..10 {
        let (_dir, pool) = file_pool();
        let service = Arc::new(ModerationService::with_sqlite_store(pool, registry()));
        let subject = SubjectRef::new("post", format!("edit-race-{round}"));
        let author = Actor::new("author");
        service
            .save_entity(&subject, post("Race", "v1"), Some(&Actor::new("admin").staff()))
            .unwrap();
        service
            .save_entity(&subject, post("Race", "v2"), Some(&author))
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let writer = {
            let (service, barrier, subject, author) = (
                Arc::clone(&service),
                Arc::clone(&barrier),
                subject.clone(),
                author.clone(),
            );
            thread::spawn(move || {
                barrier.wait();
                service.save_entity(&subject, post("Race", "v3"), Some(&author))
            })
        };
        let approver = {
            let (service, barrier, subject) =
                (Arc::clone(&service), Arc::clone(&barrier), subject.clone());
            thread::spawn(move || {
                barrier.wait();
                service.approve(&subject, "mod", None)
            })
        };

        writer
            .join()
            .expect("writer panicked")
            .expect("write should succeed");
        approver
            .join()
            .expect("approver panicked")
            .expect("approve should succeed");

        let record = service.record(&subject).unwrap().expect("record should exist");
        let live = service.moderated_get(&subject).unwrap();
        let tail: Vec<NotificationEvent> = {
            let conn = service.pool().get().unwrap();
            let events: Vec<NotificationEvent> = query_outbox(
                &conn,
                &OutboxFilter {
                    object_pk: Some(subject.object_pk.clone()),
                    ..Default::default()
                },
            )
            .unwrap()
            .into_iter()
            .map(|entry| entry.notification.event)
            .collect();
            events[events.len() - 2..].to_vec()
        };

        match record.status {
            // Approve went first and published v2; v3 waits for review.
            ModerationStatus::Pending => {
                assert_eq!(record.current_snapshot, Some(post("Race", "v2")));
                assert_eq!(record.pending_snapshot, Some(post("Race", "v3")));
                assert_eq!(live, Some(post("Race", "v2")));
                assert_eq!(
                    tail,
                    vec![NotificationEvent::UserApproved, NotificationEvent::ModeratorPending]
                );
            }
            // The write superseded v2 first; approve published what was pending.
            ModerationStatus::Approved => {
                assert_eq!(record.current_snapshot, Some(post("Race", "v3")));
                assert_eq!(record.pending_snapshot, None);
                assert_eq!(live, Some(post("Race", "v3")));
                assert_eq!(
                    tail,
                    vec![NotificationEvent::ModeratorPending, NotificationEvent::UserApproved]
                );
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(service.raw_get(&subject).unwrap(), Some(post("Race", "v3")));
    }
}

#[test]
fn test_concurrent_writers_keep_one_record_and_the_approved_baseline() {
    let (_dir, pool) = file_pool();
    let service = Arc::new(ModerationService::with_sqlite_store(pool, registry()));
    let subject = SubjectRef::new("post", "shared");
    service
        .save_entity(&subject, post("Shared", "v0"), Some(&Actor::new("admin").staff()))
        .unwrap();

    let writers: Vec<_> = (0..8)
        .map(|i| {
            let service = Arc::clone(&service);
            let subject = subject.clone();
            thread::spawn(move || {
                let author = Actor::new(format!("author-{i}"));
                service.save_entity(&subject, post("Shared", &format!("edit-{i}")), Some(&author))
            })
        })
        .collect();

    for writer in writers {
        let outcome = writer.join().expect("writer panicked").expect("write should succeed");
        assert!(
            matches!(
                outcome,
                WriteOutcome::HeldForReview { .. } | WriteOutcome::AlreadyPending { .. }
            ),
            "got {outcome:?}"
        );
    }

    // Every hold restored the approved values, never another writer's edit.
    assert_eq!(
        service.moderated_get(&subject).unwrap(),
        Some(post("Shared", "v0"))
    );
    let record = service.record(&subject).unwrap().expect("record should exist");
    assert_eq!(record.status, ModerationStatus::Pending);
    assert_eq!(record.current_snapshot, Some(post("Shared", "v0")));
    assert_eq!(service.records(&Default::default()).unwrap().len(), 1);
}

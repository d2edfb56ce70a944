//! Teacher session lifecycle: `NoOpenSession -> Open -> Closed`.
//!
//! Opening matches the tap against the timetable and prepares one record per
//! enrolled student. Closing classifies whoever already left, then hands the
//! session to the finalization scheduler.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use super::classifier::classify_within;
use super::{AttendancePolicy, FinalizationScheduler, TapOutcome};
use crate::clock::{CivilClock, CivilNow};
use crate::error::{AttendanceError, Result};
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendanceRecord};
use crate::model::session::{NewSession, Session};
use crate::store::Stores;

pub struct SessionMachine {
    stores: Stores,
    clock: Arc<dyn CivilClock>,
    policy: AttendancePolicy,
    scheduler: Arc<FinalizationScheduler>,
}

impl SessionMachine {
    pub fn new(
        stores: Stores,
        clock: Arc<dyn CivilClock>,
        policy: AttendancePolicy,
        scheduler: Arc<FinalizationScheduler>,
    ) -> Self {
        Self {
            stores,
            clock,
            policy,
            scheduler,
        }
    }

    #[instrument(name = "teacher_tap", skip(self))]
    pub async fn tap(&self, teacher_id: u64, card_id: Option<u64>) -> Result<TapOutcome> {
        let now = self.clock.now();

        match self.stores.attendance.find_open_session(teacher_id).await? {
            Some(session) => self.close(session, now).await,
            None => self.open(teacher_id, card_id, now).await,
        }
    }

    async fn open(&self, teacher_id: u64, card_id: Option<u64>, now: CivilNow) -> Result<TapOutcome> {
        let slot = self
            .stores
            .timetable
            .slot_near(teacher_id, now.weekday(), now.time, self.policy.slot_tolerance)
            .await?
            .ok_or_else(|| {
                debug!(weekday = %now.weekday(), at = %now.time, "No timetable slot near tap");
                AttendanceError::not_found("no class scheduled")
            })?;

        let session = self
            .stores
            .attendance
            .insert_session(NewSession {
                teacher_id,
                course_id: slot.course_id,
                group_id: slot.group_id,
                date: now.date,
                start_time: now.time,
                card_id,
            })
            .await?;

        info!(
            session_id = session.id,
            course_id = session.course_id,
            group_id = session.group_id,
            slot_start = %slot.start_time,
            "Session opened"
        );

        self.prepare_roster(&session).await?;

        Ok(TapOutcome::SessionOpened {
            session_id: session.id,
            course_id: session.course_id,
            group_id: session.group_id,
        })
    }

    /// Links today's records of every enrolled student to the session, or
    /// pre-creates an absence for students with nothing to link.
    async fn prepare_roster(&self, session: &Session) -> Result<()> {
        let students = self
            .stores
            .enrollment
            .students_of(session.course_id, session.group_id)
            .await?;

        debug!(session_id = session.id, enrolled = students.len(), "Preparing roster");

        for student_id in students {
            if let Err(e) = self.prepare_student(session, student_id).await {
                error!(
                    error = %e,
                    session_id = session.id,
                    student_id,
                    "Failed to prepare attendance record, skipping"
                );
            }
        }
        Ok(())
    }

    async fn prepare_student(&self, session: &Session, student_id: u64) -> Result<()> {
        let card_id = self.stores.cards.card_for_user(student_id).await?;
        let records = self
            .stores
            .attendance
            .student_records(student_id, session.date)
            .await?;

        // only a record the student is still checked into, or an absence
        // placeholder of this class; never one tagged to another course/group
        let same_class = |r: &AttendanceRecord| r.belongs_to(session.course_id, session.group_id);
        let linkable = records.into_iter().find(|r| {
            (r.is_checked_in() && ((r.session_id.is_none() && r.course_id.is_none()) || same_class(r)))
                || (r.is_placeholder() && same_class(r))
        });

        match linkable {
            Some(mut record) => {
                record.session_id = Some(session.id);
                record.course_id = Some(session.course_id);
                record.group_id = Some(session.group_id);
                record.card_id = record.card_id.or(card_id);
                self.stores.attendance.update_record(&record).await?;
                debug!(record_id = record.id, student_id, "Linked existing record to session");
            }
            None => {
                let record = self
                    .stores
                    .attendance
                    .insert_record(NewAttendanceRecord::absent(
                        student_id,
                        session.id,
                        session.course_id,
                        session.group_id,
                        session.date,
                        card_id,
                    ))
                    .await?;
                debug!(record_id = record.id, student_id, "Absence placeholder created");
            }
        }
        Ok(())
    }

    async fn close(&self, session: Session, now: CivilNow) -> Result<TapOutcome> {
        let elapsed = now.datetime() - session.started_at();
        if elapsed < self.policy.debounce {
            debug!(session_id = session.id, elapsed_secs = elapsed.num_seconds(), "Close debounced");
            return Ok(TapOutcome::SessionTooRecent {
                session_id: session.id,
                minutes: elapsed.num_minutes(),
            });
        }

        self.stores
            .attendance
            .close_session(session.id, now.time)
            .await?;
        let session = Session {
            end_time: Some(now.time),
            ..session
        };

        info!(
            session_id = session.id,
            minutes = elapsed.num_minutes(),
            "Session closed"
        );

        self.classify_departed(&session, now.time).await;

        if self.scheduler.schedule(session.clone()).is_none() {
            warn!(session_id = session.id, "Session closed without a queued finalization");
        }

        Ok(TapOutcome::SessionClosed {
            session_id: session.id,
            minutes: elapsed.num_minutes(),
        })
    }

    /// Close-time pass: classifies students who already checked out.
    /// Best effort; finalization catches whatever is skipped here.
    async fn classify_departed(&self, session: &Session, teacher_exit: chrono::NaiveTime) {
        let records = match self
            .stores
            .attendance
            .class_records(session.date, session.course_id, session.group_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, session_id = session.id, "Close-time classification skipped");
                return;
            }
        };

        for mut record in records {
            let Some(student_exit) = record.check_out else {
                continue;
            };
            if record.check_in.is_none() || record.status != AttendanceStatus::PendingEntry {
                continue;
            }

            record.status = classify_within(student_exit, teacher_exit, self.policy.present_tolerance);
            record.session_id = Some(session.id);

            if let Err(e) = self.stores.attendance.update_record(&record).await {
                error!(
                    error = %e,
                    record_id = record.id,
                    student_id = record.student_id,
                    "Close-time classification failed for record"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::Finalizer;
    use crate::attendance::testkit::{ALICE, BOB, COURSE, GROUP, Harness, TEACHER, harness, monday};
    use chrono::NaiveTime;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn machine(h: &Harness) -> (SessionMachine, Arc<FinalizationScheduler>) {
        let finalizer = Arc::new(Finalizer::new(h.stores.clone(), h.policy));
        let scheduler = FinalizationScheduler::start(finalizer, h.policy.finalize_delay, 2);
        let machine = SessionMachine::new(h.stores.clone(), h.clock.clone(), h.policy, scheduler.clone());
        (machine, scheduler)
    }

    #[tokio::test]
    async fn opens_twenty_minutes_before_the_slot() {
        let h = harness();
        let (sessions, _) = machine(&h);
        h.clock.set(8, 40, 0);

        let outcome = sessions.tap(TEACHER, Some(1)).await.unwrap();

        assert!(matches!(outcome, TapOutcome::SessionOpened { course_id: COURSE, group_id: GROUP, .. }));
        let opened = &h.store.sessions()[0];
        assert_eq!(opened.start_time, t(8, 40, 0));
        assert_eq!(opened.card_id, Some(1));
    }

    #[tokio::test]
    async fn twenty_one_minutes_early_is_no_class() {
        let h = harness();
        let (sessions, _) = machine(&h);
        h.clock.set(8, 39, 0);

        let err = sessions.tap(TEACHER, None).await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: no class scheduled");
        assert!(h.store.sessions().is_empty());
    }

    #[tokio::test]
    async fn opening_prepares_a_record_per_enrolled_student() {
        let h = harness();
        // Alice tapped in before the teacher arrived
        h.store.put_record(AttendanceRecord {
            id: 1,
            student_id: ALICE,
            session_id: None,
            course_id: None,
            group_id: None,
            date: monday(),
            check_in: Some(t(8, 55, 0)),
            check_out: None,
            status: AttendanceStatus::PendingEntry,
            card_id: None,
        });
        let (sessions, _) = machine(&h);
        h.clock.set(9, 0, 0);

        sessions.tap(TEACHER, None).await.unwrap();

        let alice = h.store.records_of(ALICE);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].session_id, Some(1));
        assert_eq!(alice[0].course_id, Some(COURSE));
        assert_eq!(alice[0].status, AttendanceStatus::PendingEntry);
        assert_eq!(alice[0].card_id, Some(2));

        let bob = h.store.records_of(BOB);
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].status, AttendanceStatus::Absent);
        assert_eq!(bob[0].check_in, None);
    }

    #[tokio::test]
    async fn records_of_another_class_are_not_reassigned() {
        let h = harness();
        h.store.put_record(AttendanceRecord {
            id: 1,
            student_id: ALICE,
            session_id: Some(42),
            course_id: Some(99),
            group_id: Some(1),
            date: monday(),
            check_in: Some(t(8, 0, 0)),
            check_out: Some(t(8, 50, 0)),
            status: AttendanceStatus::Present,
            card_id: None,
        });
        let (sessions, _) = machine(&h);

        sessions.tap(TEACHER, None).await.unwrap();

        let alice = h.store.records_of(ALICE);
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].course_id, Some(99));
        assert_eq!(alice[1].status, AttendanceStatus::Absent);
        assert_eq!(alice[1].course_id, Some(COURSE));
    }

    #[tokio::test]
    async fn an_earlier_closed_record_is_not_linked() {
        let h = harness();
        // Alice attended 07:00-07:50 and left before this class
        let earlier = AttendanceRecord {
            id: 1,
            student_id: ALICE,
            session_id: None,
            course_id: None,
            group_id: None,
            date: monday(),
            check_in: Some(t(7, 0, 0)),
            check_out: Some(t(7, 50, 0)),
            status: AttendanceStatus::PendingEntry,
            card_id: None,
        };
        h.store.put_record(earlier.clone());
        let (sessions, scheduler) = machine(&h);

        sessions.tap(TEACHER, None).await.unwrap();
        h.clock.set(9, 50, 0);
        sessions.tap(TEACHER, None).await.unwrap();

        let alice = h.store.records_of(ALICE);
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0], earlier);
        assert_eq!(alice[1].status, AttendanceStatus::Absent);
        assert_eq!(alice[1].session_id, Some(1));
        assert_eq!((alice[1].course_id, alice[1].group_id), (Some(COURSE), Some(GROUP)));

        scheduler.drain().await;
    }

    #[tokio::test]
    async fn placeholder_of_the_same_class_is_reused() {
        let h = harness();
        h.store.put_record(
            NewAttendanceRecord::absent(ALICE, 42, COURSE, GROUP, monday(), Some(2)).into_record(1),
        );
        let (sessions, _) = machine(&h);

        sessions.tap(TEACHER, None).await.unwrap();

        let alice = h.store.records_of(ALICE);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].session_id, Some(1));
        assert_eq!(alice[0].status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn close_is_debounced_until_five_minutes() {
        let h = harness();
        let (sessions, scheduler) = machine(&h);
        sessions.tap(TEACHER, None).await.unwrap();

        h.clock.set(9, 4, 59);
        let outcome = sessions.tap(TEACHER, None).await.unwrap();
        assert!(matches!(outcome, TapOutcome::SessionTooRecent { minutes: 4, .. }));
        assert!(h.store.sessions()[0].is_open());
        assert_eq!(scheduler.pending(), 0);

        h.clock.set(9, 5, 0);
        let outcome = sessions.tap(TEACHER, None).await.unwrap();
        assert!(matches!(outcome, TapOutcome::SessionClosed { minutes: 5, .. }));
        assert_eq!(h.store.sessions()[0].end_time, Some(t(9, 5, 0)));
        assert_eq!(scheduler.pending(), 1);

        scheduler.drain().await;
    }

    #[tokio::test]
    async fn closing_classifies_students_who_already_left() {
        let h = harness();
        let (sessions, scheduler) = machine(&h);
        sessions.tap(TEACHER, None).await.unwrap();

        // Alice left 10 minutes before the teacher, Bob 30 minutes before
        let mut alice = h.store.records_of(ALICE)[0].clone();
        alice.check_in = Some(t(9, 1, 0));
        alice.check_out = Some(t(9, 40, 0));
        alice.status = AttendanceStatus::PendingEntry;
        let mut bob = h.store.records_of(BOB)[0].clone();
        bob.check_in = Some(t(9, 2, 0));
        bob.check_out = Some(t(9, 20, 0));
        bob.status = AttendanceStatus::PendingEntry;
        h.stores.attendance.update_record(&alice).await.unwrap();
        h.stores.attendance.update_record(&bob).await.unwrap();

        h.clock.set(9, 50, 0);
        sessions.tap(TEACHER, None).await.unwrap();

        assert_eq!(h.store.records_of(ALICE)[0].status, AttendanceStatus::Present);
        assert_eq!(h.store.records_of(BOB)[0].status, AttendanceStatus::Partial);

        scheduler.drain().await;
    }

    #[tokio::test]
    async fn a_new_tap_after_close_opens_the_next_slot_only_if_scheduled() {
        let h = harness();
        let (sessions, scheduler) = machine(&h);
        sessions.tap(TEACHER, None).await.unwrap();
        h.clock.set(9, 50, 0);
        sessions.tap(TEACHER, None).await.unwrap();

        h.clock.set(9, 55, 0);
        let err = sessions.tap(TEACHER, None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.store.sessions().len(), 1);

        scheduler.drain().await;
    }
}

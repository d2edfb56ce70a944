//! Single entry point for card taps.

use tracing::{info, instrument, warn};

use super::{SessionMachine, StudentMachine, TapOutcome};
use crate::error::{AttendanceError, Result};
use crate::model::role::RoleTag;
use crate::store::Stores;

pub struct TapDispatcher {
    stores: Stores,
    students: StudentMachine,
    sessions: SessionMachine,
}

impl TapDispatcher {
    pub fn new(stores: Stores, students: StudentMachine, sessions: SessionMachine) -> Self {
        Self {
            stores,
            students,
            sessions,
        }
    }

    /// Resolves the card and the claimed user, then hands the tap to the
    /// machine matching the user's highest-precedence role.
    #[instrument(skip(self), fields(user_id = tracing::field::Empty))]
    pub async fn process_tap(&self, card_uid: &str, email: &str) -> Result<TapOutcome> {
        let card_uid = card_uid.trim();

        if !self.stores.cards.card_exists(card_uid).await? {
            warn!("Tap with unregistered card");
            return Err(AttendanceError::not_found("card"));
        }
        let card_id = self.stores.cards.card_id(card_uid).await?;

        let user_id = self
            .stores
            .identities
            .user_id(email.trim())
            .await?
            .ok_or_else(|| AttendanceError::not_found("user"))?;
        tracing::Span::current().record("user_id", user_id);

        let roles = self.stores.identities.roles_of(user_id).await?;
        let route = RoleTag::PRECEDENCE.into_iter().find(|r| roles.contains(r));

        let outcome = match route {
            Some(RoleTag::Teacher) => self.sessions.tap(user_id, card_id).await?,
            Some(RoleTag::Student) => self.students.tap(user_id, card_id).await?,
            Some(RoleTag::Admin) => TapOutcome::AdminIgnored,
            None => TapOutcome::RoleNotRecognized,
        };

        info!(
            role = ?route,
            outcome = outcome.kind(),
            changed = outcome.changed_state(),
            "Tap processed"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use chrono::NaiveTime;

    use super::*;
    use crate::attendance::testkit::{ALICE, BOB, Harness, TEACHER, harness};
    use crate::attendance::{FinalizationScheduler, Finalizer};
    use crate::model::attendance::AttendanceStatus;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dispatcher(h: &Harness) -> (TapDispatcher, Arc<FinalizationScheduler>) {
        let finalizer = Arc::new(Finalizer::new(h.stores.clone(), h.policy));
        let scheduler = FinalizationScheduler::start(finalizer, h.policy.finalize_delay, 2);
        let dispatcher = TapDispatcher::new(
            h.stores.clone(),
            StudentMachine::new(h.stores.clone(), h.clock.clone(), h.policy),
            SessionMachine::new(h.stores.clone(), h.clock.clone(), h.policy, scheduler.clone()),
        );
        (dispatcher, scheduler)
    }

    #[tokio::test]
    async fn unknown_card_and_unknown_user_are_not_found() {
        let h = harness();
        let (taps, _) = dispatcher(&h);

        let err = taps.process_tap("NOPE", "alice@school.test").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: card");

        let err = taps.process_tap("S-001", "ghost@school.test").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: user");

        assert!(h.store.records().is_empty());
    }

    #[tokio::test]
    async fn teacher_role_wins_over_student_role() {
        let h = harness();
        h.store.add_user(
            7,
            "both@school.test",
            &[RoleTag::Student, RoleTag::Admin, RoleTag::Teacher],
        );
        let (taps, _) = dispatcher(&h);

        // no slot for user 7, so the session machine answers
        let err = taps.process_tap("T-100", "both@school.test").await.unwrap_err();
        assert_eq!(err.to_string(), "Not found: no class scheduled");
        assert!(h.store.records_of(7).is_empty());
    }

    #[tokio::test]
    async fn admin_only_and_roleless_users_are_informational() {
        let h = harness();
        h.store.add_user(8, "admin@school.test", &[RoleTag::Admin]);
        h.store.add_user(9, "nobody@school.test", &[]);
        let (taps, _) = dispatcher(&h);

        let outcome = taps.process_tap("S-001", "admin@school.test").await.unwrap();
        assert_eq!(outcome, TapOutcome::AdminIgnored);
        let outcome = taps.process_tap("S-001", "nobody@school.test").await.unwrap();
        assert_eq!(outcome, TapOutcome::RoleNotRecognized);
        assert_eq!(outcome.to_string(), "Role not recognized for attendance processing");

        assert!(h.store.records().is_empty());
        assert!(h.store.sessions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_class_from_open_to_finalization() {
        let h = harness();
        let (taps, scheduler) = dispatcher(&h);

        h.clock.set(9, 0, 0);
        let opened = taps.process_tap("T-100", "teacher@school.test").await.unwrap();
        assert!(matches!(opened, TapOutcome::SessionOpened { .. }));

        h.clock.set(9, 5, 0);
        let checked_in = taps.process_tap("S-001", "alice@school.test").await.unwrap();
        assert!(matches!(checked_in, TapOutcome::CheckedIn { .. }));

        h.clock.set(9, 12, 0);
        let checked_out = taps.process_tap("S-001", "alice@school.test").await.unwrap();
        assert_eq!(
            checked_out.to_string(),
            "Check-out recorded after 7 minutes"
        );
        assert_eq!(h.store.records_of(ALICE)[0].status, AttendanceStatus::PendingEntry);

        h.clock.set(9, 50, 0);
        let closed = taps.process_tap("T-100", "teacher@school.test").await.unwrap();
        assert!(matches!(closed, TapOutcome::SessionClosed { minutes: 50, .. }));

        // |09:12 - 09:50| = 38 min
        let alice = h.store.records_of(ALICE);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].status, AttendanceStatus::Partial);
        assert_eq!((alice[0].check_in, alice[0].check_out), (Some(t(9, 5)), Some(t(9, 12))));

        h.clock.set(10, 0, 0);
        tokio::time::sleep(StdDuration::from_secs(10 * 60 + 1)).await;

        let bob = h.store.records_of(BOB);
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].status, AttendanceStatus::Absent);
        assert_eq!(bob[0].session_id, Some(1));
        assert_eq!(h.store.records_of(ALICE)[0].status, AttendanceStatus::Partial);
        assert_eq!(h.store.records_of(TEACHER).len(), 0);

        scheduler.drain().await;
        assert_eq!(scheduler.pending(), 0);
    }
}

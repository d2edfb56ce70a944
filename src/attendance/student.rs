//! Per-student daily check-in/check-out.
//!
//! `NoRecordToday -> OpenCheckedIn -> Closed`. Each tap re-reads the current
//! record before writing, so a student's taps apply in arrival order.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::classifier::classify_within;
use super::{AttendancePolicy, TapOutcome};
use crate::clock::{CivilClock, CivilNow};
use crate::error::Result;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendanceRecord};
use crate::store::Stores;

pub struct StudentMachine {
    stores: Stores,
    clock: Arc<dyn CivilClock>,
    policy: AttendancePolicy,
}

impl StudentMachine {
    pub fn new(stores: Stores, clock: Arc<dyn CivilClock>, policy: AttendancePolicy) -> Self {
        Self {
            stores,
            clock,
            policy,
        }
    }

    #[instrument(name = "student_tap", skip(self))]
    pub async fn tap(&self, student_id: u64, card_id: Option<u64>) -> Result<TapOutcome> {
        let now = self.clock.now();

        let open = self
            .stores
            .attendance
            .find_open_record(student_id, now.date)
            .await?;

        match open {
            None => self.check_in(student_id, card_id, now).await,
            Some(record) if record.is_placeholder() => {
                self.check_into_placeholder(record, card_id, now).await
            }
            Some(record) => self.check_out(record, now).await,
        }
    }

    async fn check_in(
        &self,
        student_id: u64,
        card_id: Option<u64>,
        now: CivilNow,
    ) -> Result<TapOutcome> {
        let record = self
            .stores
            .attendance
            .insert_record(NewAttendanceRecord::check_in(
                student_id, now.date, now.time, card_id,
            ))
            .await?;

        info!(record_id = record.id, at = %now.time, "Check-in recorded");
        Ok(TapOutcome::CheckedIn {
            record_id: record.id,
        })
    }

    /// The session already pre-created this record as an absence.
    async fn check_into_placeholder(
        &self,
        mut record: AttendanceRecord,
        card_id: Option<u64>,
        now: CivilNow,
    ) -> Result<TapOutcome> {
        record.check_in = Some(now.time);
        record.status = AttendanceStatus::PendingEntry;
        record.card_id = record.card_id.or(card_id);
        self.stores.attendance.update_record(&record).await?;

        info!(
            record_id = record.id,
            session_id = ?record.session_id,
            at = %now.time,
            "Check-in recorded on session placeholder"
        );
        Ok(TapOutcome::CheckedIn {
            record_id: record.id,
        })
    }

    async fn check_out(&self, mut record: AttendanceRecord, now: CivilNow) -> Result<TapOutcome> {
        let Some(checked_in_at) = record.checked_in_at() else {
            // find_open_record only yields checked-in records or placeholders
            return self.check_into_placeholder(record, None, now).await;
        };

        let elapsed = now.datetime() - checked_in_at;
        if elapsed < self.policy.debounce {
            debug!(record_id = record.id, elapsed_secs = elapsed.num_seconds(), "Tap debounced");
            return Ok(TapOutcome::CheckOutTooSoon {
                record_id: record.id,
                minutes: elapsed.num_minutes(),
            });
        }

        record.check_out = Some(now.time);

        if let Some(teacher_exit) = self.teacher_exit(&record).await? {
            record.status = classify_within(now.time, teacher_exit, self.policy.present_tolerance);
        }

        self.stores.attendance.update_record(&record).await?;

        info!(
            record_id = record.id,
            status = %record.status,
            minutes = elapsed.num_minutes(),
            "Check-out recorded"
        );
        Ok(TapOutcome::CheckedOut {
            record_id: record.id,
            minutes: elapsed.num_minutes(),
            status: record.status,
        })
    }

    /// End time of the owning session, once the teacher has closed it.
    async fn teacher_exit(&self, record: &AttendanceRecord) -> Result<Option<chrono::NaiveTime>> {
        if record.status != AttendanceStatus::PendingEntry {
            return Ok(None);
        }
        let Some(session_id) = record.session_id else {
            return Ok(None);
        };
        let session = self.stores.attendance.session(session_id).await?;
        Ok(session.and_then(|s| s.end_time))
    }
}

//! Deferred reconciliation of one closed session.
//!
//! The batch is idempotent: running it twice leaves the same record set, and
//! records already finalized as Present or Partial are never rewritten.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use super::AttendancePolicy;
use super::classifier::classify_within;
use crate::error::Result;
use crate::model::attendance::{AttendanceRecord, AttendanceStatus, NewAttendanceRecord};
use crate::model::session::Session;
use crate::store::Stores;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FinalizationReport {
    pub linked: usize,
    pub classified: usize,
    pub marked_partial: usize,
    pub absences_inserted: usize,
    pub failures: usize,
}

pub struct Finalizer {
    stores: Stores,
    policy: AttendancePolicy,
}

impl Finalizer {
    pub fn new(stores: Stores, policy: AttendancePolicy) -> Self {
        Self { stores, policy }
    }

    /// Reconciles every record of the session's class and date. Per-record
    /// failures are logged and counted; only failing to list the class aborts.
    #[instrument(name = "finalize_session", skip(self, session), fields(session_id = session.id))]
    pub async fn finalize(&self, session: &Session) -> Result<FinalizationReport> {
        let mut report = FinalizationReport::default();

        let records = self
            .stores
            .attendance
            .class_records(session.date, session.course_id, session.group_id)
            .await?;

        let mut seen: HashSet<u64> = HashSet::with_capacity(records.len());
        for record in records {
            seen.insert(record.student_id);
            self.reconcile(session, record, &mut report).await;
        }

        let enrolled = self
            .stores
            .enrollment
            .students_of(session.course_id, session.group_id)
            .await?;

        for student_id in enrolled.into_iter().filter(|id| !seen.contains(id)) {
            match self.insert_absence(session, student_id).await {
                Ok(()) => report.absences_inserted += 1,
                Err(e) => {
                    error!(error = %e, student_id, "Failed to insert absence, skipping");
                    report.failures += 1;
                }
            }
        }

        Ok(report)
    }

    async fn reconcile(
        &self,
        session: &Session,
        mut record: AttendanceRecord,
        report: &mut FinalizationReport,
    ) {
        let original = record.clone();

        if record.session_id.is_none() {
            record.session_id = Some(session.id);
            report.linked += 1;
        }

        match (record.check_in, record.check_out) {
            (Some(_), Some(student_exit)) if record.status == AttendanceStatus::PendingEntry => {
                match session.end_time {
                    Some(teacher_exit) => {
                        record.status = classify_within(
                            student_exit,
                            teacher_exit,
                            self.policy.present_tolerance,
                        );
                        report.classified += 1;
                    }
                    None => warn!(record_id = record.id, "Session has no end time, cannot classify"),
                }
            }
            (Some(_), None) if !record.status.is_final() => {
                // never tapped out
                record.status = AttendanceStatus::Partial;
                report.marked_partial += 1;
            }
            _ => {}
        }

        if record == original {
            return;
        }

        if let Err(e) = self.stores.attendance.update_record(&record).await {
            error!(
                error = %e,
                record_id = record.id,
                student_id = record.student_id,
                "Failed to finalize record, skipping"
            );
            report.failures += 1;
        } else {
            debug!(record_id = record.id, status = %record.status, "Record finalized");
        }
    }

    async fn insert_absence(&self, session: &Session, student_id: u64) -> Result<()> {
        let card_id = self.stores.cards.card_for_user(student_id).await?;
        self.stores
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
        Ok(())
    }
}

//! Narrow read/write interfaces the attendance core depends on.
//!
//! Every collaborator is an async trait so the state machines can run against
//! MySQL in production and against [`memory::MemoryStore`] in tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};

use crate::error::Result;
use crate::model::attendance::{AttendanceRecord, NewAttendanceRecord};
use crate::model::card::Card;
use crate::model::role::RoleTag;
use crate::model::session::{NewSession, Session};
use crate::model::timetable::TimetableSlot;
use crate::model::user::User;

pub mod mysql;

#[cfg(test)]
pub mod memory;

#[async_trait]
pub trait CardRegistry: Send + Sync {
    async fn card_exists(&self, uid: &str) -> Result<bool>;

    async fn card_id(&self, uid: &str) -> Result<Option<u64>>;

    /// Most recently registered card bound to `user_id`.
    async fn card_for_user(&self, user_id: u64) -> Result<Option<u64>>;

    /// Fails with `Conflict` if the UID is already registered.
    async fn register_card(&self, uid: &str, user_id: Option<u64>) -> Result<Card>;
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn find_user(&self, email: &str) -> Result<Option<User>>;

    async fn roles_of(&self, user_id: u64) -> Result<BTreeSet<RoleTag>>;

    async fn user_id(&self, email: &str) -> Result<Option<u64>> {
        Ok(self.find_user(email).await?.map(|u| u.id))
    }

    async fn has_role(&self, user_id: u64, role: RoleTag) -> Result<bool> {
        Ok(self.roles_of(user_id).await?.contains(&role))
    }
}

#[async_trait]
pub trait TimetableLookup: Send + Sync {
    /// A slot of `teacher_id` on `weekday` whose start lies within `tolerance`
    /// of `time`, bounds inclusive.
    async fn slot_near(
        &self,
        teacher_id: u64,
        weekday: Weekday,
        time: NaiveTime,
        tolerance: Duration,
    ) -> Result<Option<TimetableSlot>>;
}

#[async_trait]
pub trait EnrollmentLookup: Send + Sync {
    async fn students_of(&self, course_id: u64, group_id: u64) -> Result<Vec<u64>>;
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// All of a student's records for `date`, newest first.
    async fn student_records(&self, student_id: u64, date: NaiveDate) -> Result<Vec<AttendanceRecord>>;

    /// Records tagged to one class on `date`.
    async fn class_records(
        &self,
        date: NaiveDate,
        course_id: u64,
        group_id: u64,
    ) -> Result<Vec<AttendanceRecord>>;

    async fn insert_record(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord>;

    async fn update_record(&self, record: &AttendanceRecord) -> Result<()>;

    async fn find_open_session(&self, teacher_id: u64) -> Result<Option<Session>>;

    async fn session(&self, session_id: u64) -> Result<Option<Session>>;

    async fn insert_session(&self, session: NewSession) -> Result<Session>;

    async fn close_session(&self, session_id: u64, end_time: NaiveTime) -> Result<()>;

    /// The record a student's next tap acts on: the checked-in one if any,
    /// otherwise the newest absence placeholder still waiting for a check-in.
    async fn find_open_record(
        &self,
        student_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>> {
        let records = self.student_records(student_id, date).await?;
        let checked_in = records.iter().find(|r| r.is_checked_in()).cloned();
        Ok(checked_in.or_else(|| records.into_iter().find(|r| r.is_placeholder())))
    }
}

/// The set of collaborators handed to the state machines.
#[derive(Clone)]
pub struct Stores {
    pub cards: Arc<dyn CardRegistry>,
    pub identities: Arc<dyn IdentityResolver>,
    pub timetable: Arc<dyn TimetableLookup>,
    pub enrollment: Arc<dyn EnrollmentLookup>,
    pub attendance: Arc<dyn AttendanceStore>,
}

impl Stores {
    /// Uses one backend for every collaborator.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: CardRegistry
            + IdentityResolver
            + TimetableLookup
            + EnrollmentLookup
            + AttendanceStore
            + 'static,
    {
        Self {
            cards: backend.clone(),
            identities: backend.clone(),
            timetable: backend.clone(),
            enrollment: backend.clone(),
            attendance: backend,
        }
    }
}

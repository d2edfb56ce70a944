//! In-memory backend used by the state machine tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveTime, Weekday};

use super::{AttendanceStore, CardRegistry, EnrollmentLookup, IdentityResolver, TimetableLookup};
use crate::error::{AttendanceError, Result};
use crate::model::attendance::{AttendanceRecord, NewAttendanceRecord};
use crate::model::card::Card;
use crate::model::role::RoleTag;
use crate::model::session::{NewSession, Session};
use crate::model::timetable::TimetableSlot;
use crate::model::user::User;

#[derive(Default)]
struct Inner {
    cards: Vec<Card>,
    users: Vec<User>,
    slots: Vec<TimetableSlot>,
    enrollments: HashMap<(u64, u64), Vec<u64>>,
    sessions: Vec<Session>,
    records: Vec<AttendanceRecord>,
    failing_students: HashSet<u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_card(&self, uid: &str, user_id: Option<u64>) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.cards.len() as u64 + 1;
        inner.cards.push(Card {
            id,
            uid: uid.to_string(),
            user_id,
        });
        id
    }

    pub fn add_user(&self, id: u64, email: &str, roles: &[RoleTag]) {
        self.inner.lock().unwrap().users.push(User {
            id,
            email: email.to_string(),
            roles: roles.iter().copied().collect(),
        });
    }

    pub fn add_slot(&self, slot: TimetableSlot) {
        self.inner.lock().unwrap().slots.push(slot);
    }

    pub fn enroll(&self, course_id: u64, group_id: u64, student_id: u64) {
        self.inner
            .lock()
            .unwrap()
            .enrollments
            .entry((course_id, group_id))
            .or_default()
            .push(student_id);
    }

    /// Makes every record write for `student_id` fail.
    pub fn fail_writes_for(&self, student_id: u64) {
        self.inner.lock().unwrap().failing_students.insert(student_id);
    }

    pub fn heal(&self) {
        self.inner.lock().unwrap().failing_students.clear();
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn records_of(&self, student_id: u64) -> Vec<AttendanceRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.student_id == student_id)
            .collect()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.lock().unwrap().sessions.clone()
    }

    pub fn put_record(&self, record: AttendanceRecord) {
        self.inner.lock().unwrap().records.push(record);
    }
}

fn check_writable(inner: &Inner, student_id: u64) -> Result<()> {
    if inner.failing_students.contains(&student_id) {
        return Err(AttendanceError::TransientData(format!(
            "write rejected for student {student_id}"
        )));
    }
    Ok(())
}

#[async_trait]
impl CardRegistry for MemoryStore {
    async fn card_exists(&self, uid: &str) -> Result<bool> {
        Ok(self.inner.lock().unwrap().cards.iter().any(|c| c.uid == uid))
    }

    async fn card_id(&self, uid: &str) -> Result<Option<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.cards.iter().find(|c| c.uid == uid).map(|c| c.id))
    }

    async fn card_for_user(&self, user_id: u64) -> Result<Option<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .cards
            .iter()
            .rev()
            .find(|c| c.user_id == Some(user_id))
            .map(|c| c.id))
    }

    async fn register_card(&self, uid: &str, user_id: Option<u64>) -> Result<Card> {
        let mut inner = self.inner.lock().unwrap();
        if inner.cards.iter().any(|c| c.uid == uid) {
            return Err(AttendanceError::conflict("card already registered"));
        }
        let card = Card {
            id: inner.cards.len() as u64 + 1,
            uid: uid.to_string(),
            user_id,
        };
        inner.cards.push(card.clone());
        Ok(card)
    }
}

#[async_trait]
impl IdentityResolver for MemoryStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn roles_of(&self, user_id: u64) -> Result<BTreeSet<RoleTag>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.roles.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TimetableLookup for MemoryStore {
    async fn slot_near(
        &self,
        teacher_id: u64,
        weekday: Weekday,
        time: NaiveTime,
        tolerance: Duration,
    ) -> Result<Option<TimetableSlot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .slots
            .iter()
            .find(|s| {
                let delta = s.start_time - time;
                s.teacher_id == teacher_id
                    && s.weekday == weekday
                    && delta <= tolerance
                    && delta >= -tolerance
            })
            .cloned())
    }
}

#[async_trait]
impl EnrollmentLookup for MemoryStore {
    async fn students_of(&self, course_id: u64, group_id: u64) -> Result<Vec<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .enrollments
            .get(&(course_id, group_id))
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn student_records(&self, student_id: u64, date: NaiveDate) -> Result<Vec<AttendanceRecord>> {
        let inner = self.inner.lock().unwrap();
        let mut records: Vec<_> = inner
            .records
            .iter()
            .filter(|r| r.student_id == student_id && r.date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(records)
    }

    async fn class_records(
        &self,
        date: NaiveDate,
        course_id: u64,
        group_id: u64,
    ) -> Result<Vec<AttendanceRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .filter(|r| r.date == date && r.belongs_to(course_id, group_id))
            .cloned()
            .collect())
    }

    async fn insert_record(&self, record: NewAttendanceRecord) -> Result<AttendanceRecord> {
        let mut inner = self.inner.lock().unwrap();
        check_writable(&inner, record.student_id)?;
        let id = inner.records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let record = record.into_record(id);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn update_record(&self, record: &AttendanceRecord) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        check_writable(&inner, record.student_id)?;
        let slot = inner
            .records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| AttendanceError::not_found("attendance record"))?;
        *slot = record.clone();
        Ok(())
    }

    async fn find_open_session(&self, teacher_id: u64) -> Result<Option<Session>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sessions
            .iter()
            .rev()
            .find(|s| s.teacher_id == teacher_id && s.is_open())
            .cloned())
    }

    async fn session(&self, session_id: u64) -> Result<Option<Session>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sessions.iter().find(|s| s.id == session_id).cloned())
    }

    async fn insert_session(&self, session: NewSession) -> Result<Session> {
        let mut inner = self.inner.lock().unwrap();
        let session = session.into_session(inner.sessions.len() as u64 + 1);
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn close_session(&self, session_id: u64, end_time: NaiveTime) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| AttendanceError::not_found("session"))?;
        session.end_time = Some(end_time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::AttendanceStatus;

    #[tokio::test]
    async fn duplicate_card_registration_conflicts() {
        let store = MemoryStore::new();
        store.register_card("04:A2", Some(1)).await.unwrap();

        let err = store.register_card("04:A2", Some(2)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.card_for_user(1).await.unwrap(), Some(1));
        assert_eq!(store.card_for_user(2).await.unwrap(), None);
    }

    #[tokio::test]
    async fn checked_in_record_wins_over_placeholder() {
        let store = MemoryStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        store
            .insert_record(NewAttendanceRecord::check_in(1, date, nine, None))
            .await
            .unwrap();
        store
            .insert_record(NewAttendanceRecord::absent(1, 4, 10, 20, date, None))
            .await
            .unwrap();

        let open = store.find_open_record(1, date).await.unwrap().unwrap();
        assert_eq!(open.id, 1);
        assert_eq!(open.status, AttendanceStatus::PendingEntry);
    }
}

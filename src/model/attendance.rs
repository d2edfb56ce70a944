use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use utoipa::ToSchema;

/// Attendance outcome; the discriminants are the ids stored in `attendance_records.status`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, ToSchema, Display)]
pub enum AttendanceStatus {
    Present = 1,
    Absent = 2,
    Partial = 3,
    PendingEntry = 5,
}

impl AttendanceStatus {
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(AttendanceStatus::Present),
            2 => Some(AttendanceStatus::Absent),
            3 => Some(AttendanceStatus::Partial),
            5 => Some(AttendanceStatus::PendingEntry),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Present and Partial are final; finalization never rewrites them.
    pub fn is_final(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Partial)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown attendance status id {0}")]
pub struct UnknownStatus(pub u8);

impl TryFrom<u8> for AttendanceStatus {
    type Error = UnknownStatus;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or(UnknownStatus(id))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: u64,
    pub student_id: u64,
    pub session_id: Option<u64>,
    pub course_id: Option<u64>,
    pub group_id: Option<u64>,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub check_out: Option<NaiveTime>,
    #[sqlx(try_from = "u8")]
    pub status: AttendanceStatus,
    pub card_id: Option<u64>,
}

impl AttendanceRecord {
    /// Checked in and not yet out.
    pub fn is_checked_in(&self) -> bool {
        self.check_in.is_some() && self.check_out.is_none()
    }

    /// An absence placeholder that the student has not tapped into yet.
    pub fn is_placeholder(&self) -> bool {
        self.check_in.is_none() && self.check_out.is_none()
    }

    pub fn checked_in_at(&self) -> Option<NaiveDateTime> {
        self.check_in.map(|t| self.date.and_time(t))
    }

    pub fn belongs_to(&self, course_id: u64, group_id: u64) -> bool {
        self.course_id == Some(course_id) && self.group_id == Some(group_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewAttendanceRecord {
    pub student_id: u64,
    pub session_id: Option<u64>,
    pub course_id: Option<u64>,
    pub group_id: Option<u64>,
    pub date: NaiveDate,
    pub check_in: Option<NaiveTime>,
    pub status: AttendanceStatus,
    pub card_id: Option<u64>,
}

impl NewAttendanceRecord {
    pub fn check_in(student_id: u64, date: NaiveDate, at: NaiveTime, card_id: Option<u64>) -> Self {
        Self {
            student_id,
            session_id: None,
            course_id: None,
            group_id: None,
            date,
            check_in: Some(at),
            status: AttendanceStatus::PendingEntry,
            card_id,
        }
    }

    pub fn absent(
        student_id: u64,
        session_id: u64,
        course_id: u64,
        group_id: u64,
        date: NaiveDate,
        card_id: Option<u64>,
    ) -> Self {
        Self {
            student_id,
            session_id: Some(session_id),
            course_id: Some(course_id),
            group_id: Some(group_id),
            date,
            check_in: None,
            status: AttendanceStatus::Absent,
            card_id,
        }
    }

    pub fn into_record(self, id: u64) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id: self.student_id,
            session_id: self.session_id,
            course_id: self.course_id,
            group_id: self.group_id,
            date: self.date,
            check_in: self.check_in,
            check_out: None,
            status: self.status,
            card_id: self.card_id,
        }
    }
}

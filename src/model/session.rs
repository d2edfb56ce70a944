use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// One teaching period: opened by the teacher's first tap, closed by a later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: u64,
    pub teacher_id: u64,
    pub course_id: u64,
    pub group_id: u64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub card_id: Option<u64>,
}

impl Session {
    pub fn started_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub teacher_id: u64,
    pub course_id: u64,
    pub group_id: u64,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub card_id: Option<u64>,
}

impl NewSession {
    pub fn into_session(self, id: u64) -> Session {
        Session {
            id,
            teacher_id: self.teacher_id,
            course_id: self.course_id,
            group_id: self.group_id,
            date: self.date,
            start_time: self.start_time,
            end_time: None,
            card_id: self.card_id,
        }
    }
}

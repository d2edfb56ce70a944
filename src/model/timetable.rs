use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimetableSlot {
    pub teacher_id: u64,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub course_id: u64,
    pub group_id: u64,
}

/// Row shape of `timetable_slots`; weekday is stored as 1 (Monday) to 7 (Sunday).
#[derive(Debug, sqlx::FromRow)]
pub struct TimetableSlotRow {
    pub teacher_id: u64,
    pub weekday: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub course_id: u64,
    pub group_id: u64,
}

pub fn weekday_number(day: Weekday) -> u8 {
    day.number_from_monday() as u8
}

pub fn weekday_from_number(n: u8) -> Option<Weekday> {
    match n {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}

impl TryFrom<TimetableSlotRow> for TimetableSlot {
    type Error = u8;

    fn try_from(row: TimetableSlotRow) -> Result<Self, Self::Error> {
        let weekday = weekday_from_number(row.weekday).ok_or(row.weekday)?;
        Ok(Self {
            teacher_id: row.teacher_id,
            weekday,
            start_time: row.start_time,
            end_time: row.end_time,
            course_id: row.course_id,
            group_id: row.group_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_numbers_follow_iso() {
        assert_eq!(weekday_number(Weekday::Mon), 1);
        assert_eq!(weekday_number(Weekday::Sun), 7);
        assert_eq!(weekday_from_number(3), Some(Weekday::Wed));
        assert_eq!(weekday_from_number(0), None);
    }
}

use chrono::{Duration, NaiveTime};

use crate::model::attendance::AttendanceStatus;

/// Default allowed gap between a student's and the teacher's exit.
pub const PRESENT_TOLERANCE_MINUTES: i64 = 15;

/// Present if the student left within 15 minutes of the teacher, Partial otherwise.
pub fn classify(student_exit: NaiveTime, teacher_exit: NaiveTime) -> AttendanceStatus {
    classify_within(
        student_exit,
        teacher_exit,
        Duration::minutes(PRESENT_TOLERANCE_MINUTES),
    )
}

/// Same rule with an explicit tolerance; the bound is inclusive.
pub fn classify_within(
    student_exit: NaiveTime,
    teacher_exit: NaiveTime,
    tolerance: Duration,
) -> AttendanceStatus {
    let diff = student_exit - teacher_exit;
    let diff = if diff < Duration::zero() { -diff } else { diff };

    if diff <= tolerance {
        AttendanceStatus::Present
    } else {
        AttendanceStatus::Partial
    }
}

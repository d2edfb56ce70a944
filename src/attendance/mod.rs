//! Tap-driven attendance core.
//!
//! A tap is resolved by the [`dispatcher`] to either the student machine
//! ([`student`]) or the teacher's session machine ([`session`]). Closing a
//! session queues a deferred [`finalizer`] run on the [`scheduler`].

use chrono::Duration;
use derive_more::Display;
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::attendance::AttendanceStatus;

pub mod classifier;
pub mod dispatcher;
pub mod finalizer;
pub mod scheduler;
pub mod session;
pub mod student;

pub use dispatcher::TapDispatcher;
pub use finalizer::{FinalizationReport, Finalizer};
pub use scheduler::FinalizationScheduler;
pub use session::SessionMachine;
pub use student::StudentMachine;

/// Timing rules applied to taps and finalization.
#[derive(Debug, Clone, Copy)]
pub struct AttendancePolicy {
    /// Minimum dwell before a repeat tap counts as a new transition.
    pub debounce: Duration,
    /// Window around a slot start in which a teacher tap opens that slot.
    pub slot_tolerance: Duration,
    /// Largest student/teacher exit gap still counted as present.
    pub present_tolerance: Duration,
    pub finalize_delay: Duration,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::minutes(5),
            slot_tolerance: Duration::minutes(20),
            present_tolerance: Duration::minutes(classifier::PRESENT_TOLERANCE_MINUTES),
            finalize_delay: Duration::minutes(10),
        }
    }
}

/// What a tap did, rendered as a human-readable message.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum TapOutcome {
    #[display(fmt = "Check-in recorded")]
    CheckedIn { record_id: u64 },

    #[display(
        fmt = "Attendance recorded {} min ago, check-out not allowed yet",
        minutes
    )]
    CheckOutTooSoon { record_id: u64, minutes: i64 },

    #[display(fmt = "Check-out recorded after {} minutes", minutes)]
    CheckedOut {
        record_id: u64,
        minutes: i64,
        status: AttendanceStatus,
    },

    #[display(fmt = "Session {} opened", session_id)]
    SessionOpened {
        session_id: u64,
        course_id: u64,
        group_id: u64,
    },

    #[display(fmt = "Session opened {} min ago, too soon to close", minutes)]
    SessionTooRecent { session_id: u64, minutes: i64 },

    #[display(fmt = "Session closed after {} minutes", minutes)]
    SessionClosed { session_id: u64, minutes: i64 },

    #[display(fmt = "Administrator cards do not record attendance")]
    AdminIgnored,

    #[display(fmt = "Role not recognized for attendance processing")]
    RoleNotRecognized,
}

impl TapOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            TapOutcome::CheckedIn { .. } => "checked_in",
            TapOutcome::CheckOutTooSoon { .. } => "check_out_too_soon",
            TapOutcome::CheckedOut { .. } => "checked_out",
            TapOutcome::SessionOpened { .. } => "session_opened",
            TapOutcome::SessionTooRecent { .. } => "session_too_recent",
            TapOutcome::SessionClosed { .. } => "session_closed",
            TapOutcome::AdminIgnored => "admin_ignored",
            TapOutcome::RoleNotRecognized => "role_not_recognized",
        }
    }

    /// False for the debounce and informational outcomes that leave state untouched.
    pub fn changed_state(&self) -> bool {
        !matches!(
            self,
            TapOutcome::CheckOutTooSoon { .. }
                | TapOutcome::SessionTooRecent { .. }
                | TapOutcome::AdminIgnored
                | TapOutcome::RoleNotRecognized
        )
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TapResponse {
    #[schema(example = "checked_in")]
    pub outcome: String,
    #[schema(example = "Check-in recorded")]
    pub message: String,
}

impl From<&TapOutcome> for TapResponse {
    fn from(outcome: &TapOutcome) -> Self {
        Self {
            outcome: outcome.kind().to_string(),
            message: outcome.to_string(),
        }
    }
}

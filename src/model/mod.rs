pub mod attendance;
pub mod card;
pub mod role;
pub mod session;
pub mod timetable;
pub mod user;

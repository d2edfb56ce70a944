pub mod attendance;
pub mod cards;
pub mod users;

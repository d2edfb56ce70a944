pub mod handlers;
pub mod password;

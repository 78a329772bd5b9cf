pub mod addentry;
pub mod auth;
pub mod card;
pub mod prereg;
pub mod register;

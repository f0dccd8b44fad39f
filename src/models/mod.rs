pub mod appointment;
pub mod booking;
pub mod credential;

pub mod address;
pub mod booking;
pub mod trip;
pub mod user;

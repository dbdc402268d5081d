pub mod helpers;
pub mod property;

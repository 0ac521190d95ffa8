pub mod activity;
pub mod result;

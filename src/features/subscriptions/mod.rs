pub mod models;
pub mod repository;
pub mod schedule;
pub mod status;

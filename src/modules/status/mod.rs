pub mod commands;
pub mod database;
pub mod embed;
pub mod probe;
pub mod publisher;
pub mod task;

pub mod admin;
pub mod auth;
pub mod chat;
pub mod server;
pub mod student;
pub mod usage;

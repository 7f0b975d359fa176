pub mod chat;
pub mod events;
pub mod generation;
pub mod models;

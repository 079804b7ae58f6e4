pub mod chat;
pub mod events;
pub mod history;
pub mod image;
pub mod models;
pub mod session;

pub mod chat;
pub mod health;
pub mod summarize;
pub mod videos;

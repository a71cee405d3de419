//! API route handlers

pub mod conversations;
pub mod health;
pub mod indexing;

//! Types shared by every Rally crate: domain models, wire events, REST DTOs
//! and the error taxonomy.

pub mod api;
pub mod error;
pub mod events;
pub mod models;

//! REST handlers, bearer-token identity, and the WebSocket gateway.

pub mod auth;
pub mod error;
pub mod gateway;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod presence;
pub mod routes;
pub mod swipes;

pub use auth::{AppState, AppStateInner};
pub use routes::router;

//! Local HTTP/JSON resource API

pub mod dto;
pub mod handlers;
pub mod routes;

pub use routes::{create_api_routes, AppState};

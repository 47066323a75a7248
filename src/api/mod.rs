//! HTTP front-end for voice recognition uploads.

pub mod models;
pub mod server;

pub use server::{build_router, start_http_server, AppState};

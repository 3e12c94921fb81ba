//! Helpdesk API Library
//!
//! This crate contains the HTTP and streaming surface of the support service.

pub mod auth;
pub mod config;
pub mod error;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

//! HTTP API Module
//!
//! Provides a REST API for the election-day operations.

mod http;

pub use http::{AppState, ErrorResponse, HttpServer};

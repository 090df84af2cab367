//! Shared building blocks for the query core and its service surface.
//!
//! - `config`: environment-driven configuration
//! - `errors`: the error taxonomy crossing the core boundary
//! - `models`: schema, request and record models
//! - `response`: unified API response envelope
//! - `middleware`: request id propagation

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;

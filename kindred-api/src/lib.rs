//! # Kindred API Server Library
//!
//! Router, configuration and handlers for the Kindred HTTP API. The binary
//! in `main.rs` wires these to a database pool and a listener; integration
//! tests build the same router against test doubles.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Rate limiting and security headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;

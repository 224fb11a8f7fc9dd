//! # Kindred Shared Library
//!
//! Domain types, persistence and integrations shared by the Kindred API server.
//!
//! ## Module Organization
//!
//! - `auth`: Password hashing, JWT tokens, request auth context and role checks
//! - `db`: Connection pool and embedded migrations
//! - `models`: Database models (users, enrollments, progress, payments, audit)
//! - `content`: Headless CMS client with cached, typed accessors
//! - `payments`: Payment gateway adapters (Stripe, Paystack, Flutterwave, mock)
//! - `donation`: Donation validation and tiers
//! - `fulfillment`: Turns a verified payment into an enrollment
//! - `progress`: Lesson completion bookkeeping
//! - `certificate`: Certificate codes and PDF rendering
//! - `exchange`: Exchange-rate cache
//! - `audit`: Fire-and-forget audit logger

pub mod audit;
pub mod auth;
pub mod certificate;
pub mod content;
pub mod db;
pub mod donation;
pub mod exchange;
pub mod fulfillment;
pub mod models;
pub mod payments;
pub mod progress;

/// Current version of the Kindred shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Core library for the competitor price-tracking pipeline.
//!
//! Exposes the domain types and components as a library so the binary and
//! integration tests share one composition surface.

pub mod canonical;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fetch;
pub mod governor;
pub mod models;
pub mod queue;
pub mod rules;
pub mod scheduler;
pub mod store;
pub mod worker;

//! Self-parlay: stake points on your own tasks, all legs or nothing.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod clock;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod server;
pub mod storage;
pub mod types;

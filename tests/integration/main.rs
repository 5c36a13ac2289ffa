//! End-to-end tests against the public library API.

mod harness;
mod lifecycle;
mod persistence;

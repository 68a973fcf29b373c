//! Domain logic for tracking long-running remote operations.
//!
//! Everything in this crate is pure: handle and status types, polling
//! configuration, the backoff calculator, classification of the initial
//! webhook response, and normalization of execution resources. The async
//! plumbing (HTTP, the poll loop, persistence) lives in
//! `hooktrack-client` and `hooktrack-db`.

pub mod backoff;
pub mod error;
pub mod execution;
pub mod invocation;
pub mod polling;
pub mod status;
pub mod types;

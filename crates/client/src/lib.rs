//! Async client for triggering and tracking long-running webhook
//! operations.
//!
//! Provides the HTTP invoker, the two status fetcher variants, the
//! cancellable poll loop, handle persistence and the [`Tracker`]
//! orchestrator that ties them together.
//!
//! [`Tracker`]: tracker::Tracker

pub mod api;
pub mod endpoint;
pub mod events;
pub mod fetcher;
pub mod resource;
pub mod session;
pub mod store;
pub mod tracker;

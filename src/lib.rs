//! Package-to-truck assignment service.
//!
//! The allocation engine lives in [`allocator`] and works on plain value
//! snapshots from [`model`]. [`depot`] is the in-memory caller that owns the
//! state and applies the engine's mutations; [`api`] exposes it over HTTP.

pub mod allocator;
pub mod api;
pub mod config;
pub mod depot;
pub mod model;
pub mod types;

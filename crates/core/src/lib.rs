//! Shared types for the Concord coordination core.
//!
//! This crate has no internal dependencies so that the store adapters, the
//! event log, and the coordinator can all agree on identifiers, lock TTL
//! bounds, presence enums, and the outbound notification protocol.

pub mod collaboration;
pub mod error;
pub mod types;

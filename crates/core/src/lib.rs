//! Shared domain types for the audiogen client.
//!
//! Holds the job [`StatusSnapshot`](status::StatusSnapshot) contract,
//! the generation request/response shapes echoed by the server, and
//! the crate-wide [`CoreError`](error::CoreError).

pub mod error;
pub mod generation;
pub mod status;
pub mod timestamp;
pub mod types;

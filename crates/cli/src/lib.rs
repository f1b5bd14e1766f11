//! `audiogen` command-line client.
//!
//! Submits generations, tracks jobs until they finish and lists the
//! server's models. The binary in `main.rs` only sets up logging and
//! maps [`run::run`]'s result to a process exit code.

pub mod args;
pub mod display;
pub mod run;

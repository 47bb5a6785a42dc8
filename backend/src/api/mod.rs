//! HTTP API module.
//!
//! This module provides the HTTP server, its response types and the log
//! broadcaster every stage of the compiler reports through.

pub mod server;
pub mod types;
pub mod logs;

pub use server::{router, start_server, CompileForm};
pub use types::*;
pub use logs::*;

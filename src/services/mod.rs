//! Asynchronous services and external integrations
//!
//! This module contains all code that deals with the sandbox collaborator,
//! processes, clocks, and logging setup.

pub mod process;
pub mod sandbox;
pub mod time_source;
#[cfg(feature = "runtime")]
pub mod tracing_setup;

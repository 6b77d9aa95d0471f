// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for turning a linked chain of pipeline nodes
//! into running processes, using `tokio::process::Command`, and for reporting
//! how each of them settled.
//!
//! - [`spawn`] implements `Pipeline::start` / `Pipeline::run`: upstream
//!   recursion, the liveness check, stdio wiring and the forwarding hop.
//! - [`completion`] holds the single-shot [`Completion`] handle and the
//!   throw-on-error mapping of exit outcomes.
//! - [`signal`] translates terminating signals into names.
//! - [`tap`] holds the error stream of a process whose view is claimed late.

pub mod completion;
pub mod signal;
pub mod spawn;
pub(crate) mod tap;

use tokio::io::AsyncRead;

pub use completion::{Completion, ExitValue};

/// A readable byte stream exposed by a started node.
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

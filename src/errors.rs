// src/errors.rs

//! Crate-wide error types and aliases.
//!
//! Pipeline failures fall into three families:
//! - [`StructuralError`]: misuse of the pipeline graph itself. Always surfaced.
//! - [`ProcessError`]: how a spawned command ended. Subject to the node's
//!   `throw_on_error` policy.
//! - [`StreamError`]: failures while forwarding bytes or feeding a sink, or a
//!   completion abandoned by its runtime.
//!   Always surfaced.
//!
//! All of them are `Clone` so a single settled outcome can be handed to every
//! waiter of a node's completion.

use std::io;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StructuralError {
    #[error("Can't pipe from {node}: Process already started")]
    AlreadyStarted { node: String },

    #[error("Can't pipe from {node}: Process already dead")]
    AlreadyDead { node: String },

    #[error("Can't pipe to {node}: Invalid pipe destination ({reason})")]
    InvalidDestination { node: String, reason: String },

    #[error("Can't start {node}: Invalid shell")]
    InvalidShell { node: String },
}

#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("{command} exited with code {code}")]
    NonZeroExit { command: String, code: i32 },

    #[error("{command} terminated by signal {signal}")]
    SignalTermination { command: String, signal: String },

    #[error("failed to spawn {command}: {source}")]
    SpawnFailure {
        command: String,
        #[source]
        source: Arc<io::Error>,
    },
}

#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("forwarding into {command} failed: {source}")]
    Forward {
        command: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("sink {sink} failed: {source}")]
    Sink {
        sink: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("{command} was abandoned before it settled")]
    Abandoned { command: String },
}

#[derive(Error, Debug, Clone)]
pub enum PipelineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl PipelineError {
    pub fn is_structural(&self) -> bool {
        matches!(self, PipelineError::Structural(_))
    }

    pub fn is_process(&self) -> bool {
        matches!(self, PipelineError::Process(_))
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, PipelineError::Stream(_))
    }
}

/// Errors raised while loading a pipeline file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

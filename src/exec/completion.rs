// src/exec/completion.rs

//! Completion handles.
//!
//! A node's completion settles exactly once. The raw [`Settlement`] is
//! published on a `watch` channel so any number of waiters observe the same
//! outcome; each [`Completion`] carries the throw-on-error policy of the node
//! it belongs to and applies it when waited on.

use std::fmt;
use std::future::{Future, IntoFuture};
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::{PipelineError, ProcessError, Result, StreamError};
use crate::exec::signal::signal_name;

/// Value a node resolves with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitValue {
    /// Exit code (or, for a suppressed spawn failure, the OS error code).
    Code(i32),
    /// Name of the terminating signal, e.g. `SIGTERM`.
    Signal(String),
}

impl ExitValue {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitValue::Code(c) => Some(*c),
            ExitValue::Signal(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitValue::Code(0))
    }
}

impl fmt::Display for ExitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitValue::Code(c) => write!(f, "{c}"),
            ExitValue::Signal(s) => f.write_str(s),
        }
    }
}

/// How the node's own process ended, before any policy is applied.
#[derive(Debug, Clone)]
pub(crate) enum ExitOutcome {
    Exited(i32),
    Signaled(String),
    SpawnFailed(Arc<io::Error>),
}

impl ExitOutcome {
    pub(crate) fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitOutcome::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitOutcome::Signaled(signal_name(sig));
            }
        }

        ExitOutcome::Signaled(signal_name(0))
    }
}

/// Everything a node waited on, recorded once all of it has finished.
#[derive(Debug, Clone)]
pub(crate) struct Settlement {
    pub(crate) command: String,
    pub(crate) exit: ExitOutcome,
    /// The upstream's result, already mapped by the upstream's own policy.
    pub(crate) upstream: Option<Result<ExitValue>>,
    /// First failure while forwarding bytes into the process.
    pub(crate) stream: Option<StreamError>,
    /// The process stopped reading its input before the upstream finished.
    pub(crate) input_closed_early: bool,
}

impl Settlement {
    /// Apply a throw-on-error policy.
    ///
    /// Precedence: own process error, then upstream error, then stream
    /// error, then the own exit value. An upstream killed by `SIGPIPE` after
    /// this process closed its input is not an error (`yes | head -n 1`).
    pub(crate) fn resolve(&self, throw_on_error: bool) -> Result<ExitValue> {
        let command = self.command.clone();
        let own = match &self.exit {
            ExitOutcome::Exited(0) => Ok(ExitValue::Code(0)),
            ExitOutcome::Exited(code) if throw_on_error => Err(ProcessError::NonZeroExit {
                command,
                code: *code,
            }),
            ExitOutcome::Exited(code) => Ok(ExitValue::Code(*code)),
            ExitOutcome::Signaled(signal) if throw_on_error => {
                Err(ProcessError::SignalTermination {
                    command,
                    signal: signal.clone(),
                })
            }
            ExitOutcome::Signaled(signal) => Ok(ExitValue::Signal(signal.clone())),
            ExitOutcome::SpawnFailed(err) if throw_on_error => Err(ProcessError::SpawnFailure {
                command,
                source: Arc::clone(err),
            }),
            ExitOutcome::SpawnFailed(err) => Ok(ExitValue::Code(err.raw_os_error().unwrap_or(-1))),
        };
        let own = own?;

        if let Some(Err(err)) = &self.upstream {
            let broken_pipe = matches!(
                err,
                PipelineError::Process(ProcessError::SignalTermination { signal, .. })
                    if signal == "SIGPIPE"
            );
            if !(broken_pipe && self.input_closed_early) {
                return Err(err.clone());
            }
        }
        if let Some(err) = &self.stream {
            return Err(PipelineError::Stream(err.clone()));
        }
        Ok(own)
    }
}

pub(crate) type SettlementSender = watch::Sender<Option<Settlement>>;

/// Cloneable handle on a node's single-shot completion.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Settlement>>,
    /// Description of the process this completion settles for.
    command: Arc<str>,
    throw_on_error: bool,
}

impl Completion {
    pub(crate) fn channel(
        command: String,
        throw_on_error: bool,
    ) -> (SettlementSender, Completion) {
        let (tx, rx) = watch::channel(None);
        let completion = Completion {
            rx,
            command: command.into(),
            throw_on_error,
        };
        (tx, completion)
    }

    /// The same settlement, interpreted under a different policy.
    pub(crate) fn with_policy(&self, throw_on_error: bool) -> Completion {
        Completion {
            rx: self.rx.clone(),
            command: Arc::clone(&self.command),
            throw_on_error,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn throws_on_error(&self) -> bool {
        self.throw_on_error
    }

    /// Wait for the node to settle and return its policy-mapped result.
    ///
    /// If the task watching the process is dropped before it settles (the
    /// runtime shut down), this fails with [`StreamError::Abandoned`].
    pub async fn wait(&self) -> Result<ExitValue> {
        let mut rx = self.rx.clone();
        let settlement = match rx.wait_for(|s| s.is_some()).await {
            Ok(settled) => settled.clone(),
            Err(_) => None,
        };

        match settlement {
            Some(s) => s.resolve(self.throw_on_error),
            None => Err(PipelineError::Stream(StreamError::Abandoned {
                command: self.command.to_string(),
            })),
        }
    }
}

impl IntoFuture for Completion {
    type Output = Result<ExitValue>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

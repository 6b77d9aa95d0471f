// src/exec/spawn.rs

//! The start protocol: turn a linked chain into running processes.
//!
//! `start()` on a node:
//! 1. returns the cached completion if the node was already started;
//! 2. recursively starts the upstream node (if any) and checks that it is
//!    still alive;
//! 3. either aliases one of the upstream's streams (alias mode) or spawns a
//!    new process (direct mode), wiring stdin/stdout/stderr;
//! 4. hands back a [`Completion`] that settles once the process exited, the
//!    input forwarding finished and the upstream settled.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::io::{AsyncWriteExt, copy};
use tokio::process::{ChildStdin, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, StreamError, StructuralError};
use crate::exec::ByteStream;
use crate::exec::completion::{Completion, ExitOutcome, Settlement, SettlementSender};
use crate::exec::tap::relay_stderr;
use crate::pipeline::node::{
    ErrorStream, Input, Mode, Node, Output, Phase, Pipeline, Process, SpawnedProcess,
    StreamSelector,
};

/// Snapshot of a node's configuration taken when it starts.
struct StartPlan {
    stdin: Input,
    stdout: Output,
    stderr: Output,
    throw_on_error: bool,
    mode: Mode,
}

/// Resolves to `true` when the process closed its input before the source
/// was exhausted.
type Feeder = JoinHandle<std::result::Result<bool, StreamError>>;

impl Pipeline {
    /// Start this node (and, recursively, everything upstream of it).
    ///
    /// Idempotent: a second call returns the same completion without
    /// spawning anything. Must be called from within a Tokio runtime.
    pub fn start(&self) -> Result<Completion> {
        self.start_inner().map(|(completion, _)| completion)
    }

    /// Start this node and wait for its completion.
    pub async fn run(&self) -> Result<crate::exec::ExitValue> {
        let completion = self.start()?;
        completion.wait().await
    }

    /// Returns the completion and whether this call did the starting.
    pub(crate) fn start_inner(&self) -> Result<(Completion, bool)> {
        let _guard = self
            .node
            .start_guard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let plan = {
            let mut st = self.node.lock();
            if let Some(completion) = &st.completion {
                debug!(node = %self, "start requested again; returning cached completion");
                return Ok((completion.clone(), false));
            }
            if self.node.command.is_none() && st.mode == Mode::Direct {
                return Err(StructuralError::InvalidShell {
                    node: self.node.describe(),
                }
                .into());
            }
            st.phase = Phase::Starting;
            StartPlan {
                stdin: st.stdin.clone(),
                stdout: st.stdout.clone(),
                stderr: st.stderr.clone(),
                throw_on_error: st.throw_on_error,
                mode: st.mode,
            }
        };

        // An error view reads a stream that is kept for it, so it does not
        // need its source to be running.
        let check_alive = plan.mode != Mode::Aliased(StreamSelector::Stderr);
        let upstream = match &plan.stdin {
            Input::Upstream(node) => match start_upstream(node, check_alive) {
                Ok(started) => Some(started),
                Err(err) => {
                    self.node.lock().phase = Phase::Idle;
                    return Err(err);
                }
            },
            _ => None,
        };

        let completion = match plan.mode {
            Mode::Aliased(stream) => {
                let Some((target, upstream_completion)) = upstream else {
                    return Err(StructuralError::InvalidShell {
                        node: self.node.describe(),
                    }
                    .into());
                };
                debug!(node = %self, upstream = %target, ?stream, "aliasing upstream stream");
                let completion = upstream_completion.with_policy(plan.throw_on_error);
                let mut st = self.node.lock();
                st.process = Some(Process::Aliased {
                    target: Arc::clone(&target.node),
                    stream,
                });
                st.completion = Some(completion.clone());
                st.phase = Phase::Started;
                drop(st);

                if stream == StreamSelector::Stderr && !pipes_output(&plan.stdout) {
                    if let Some(errors) = target.node.take_stream(StreamSelector::Stderr) {
                        tokio::spawn(drain_to_stderr(self.node.describe(), errors));
                    }
                }
                completion
            }
            Mode::Direct => self.spawn(plan, upstream)?,
        };

        Ok((completion, true))
    }

    fn spawn(
        &self,
        plan: StartPlan,
        upstream: Option<(Pipeline, Completion)>,
    ) -> Result<Completion> {
        let Some(program) = self.node.command.clone() else {
            return Err(StructuralError::InvalidShell {
                node: self.node.describe(),
            }
            .into());
        };
        let describe = self.node.describe();

        let stderr_view = if pipes_output(&plan.stderr) {
            None
        } else {
            claimable_view(&plan.stderr)
        };

        let mut cmd = Command::new(&program);
        cmd.args(&self.node.args)
            .stdin(match plan.stdin {
                Input::Inherit => Stdio::inherit(),
                Input::Buffer(_) | Input::Upstream(_) => Stdio::piped(),
            })
            .stdout(stdio(pipes_output(&plan.stdout)))
            .stderr(stdio(pipes_output(&plan.stderr) || stderr_view.is_some()))
            .kill_on_drop(true);

        let (tx, completion) = Completion::channel(describe.clone(), plan.throw_on_error);
        let upstream_completion = upstream.as_ref().map(|(_, c)| c.clone());

        match cmd.spawn() {
            Ok(mut child) => {
                let pid = child.id();
                info!(node = %describe, pid, "spawned process");

                let feeder = match (plan.stdin, child.stdin.take()) {
                    (Input::Buffer(bytes), Some(stdin)) => {
                        Some(tokio::spawn(feed_buffer(describe.clone(), bytes, stdin)))
                    }
                    (Input::Upstream(_), Some(stdin)) => upstream
                        .as_ref()
                        .and_then(|(up, _)| up.take_output())
                        .map(|source| tokio::spawn(forward(describe.clone(), source, stdin))),
                    _ => None,
                };

                let stderr = match (child.stderr.take(), stderr_view) {
                    (Some(pipe), Some(view)) => {
                        let (claim_tx, claim_rx) = oneshot::channel();
                        tokio::spawn(relay_stderr(describe.clone(), pipe, claim_rx, view));
                        Some(ErrorStream::Tapped(claim_tx))
                    }
                    (Some(pipe), None) => Some(ErrorStream::Pipe(pipe)),
                    (None, _) => None,
                };

                let exited = Arc::new(AtomicBool::new(false));
                {
                    let mut st = self.node.lock();
                    st.process = Some(Process::Spawned(SpawnedProcess {
                        pid,
                        stdout: child.stdout.take(),
                        stderr,
                        exited: Arc::clone(&exited),
                    }));
                    st.completion = Some(completion.clone());
                    st.phase = Phase::Started;
                }

                tokio::spawn(async move {
                    let exit = match child.wait().await {
                        Ok(status) => ExitOutcome::from_status(status),
                        Err(err) => ExitOutcome::SpawnFailed(Arc::new(err)),
                    };
                    exited.store(true, Ordering::SeqCst);
                    info!(node = %describe, pid, ?exit, "process exited");

                    settle(tx, describe, exit, feeder, upstream_completion).await;
                });
            }
            Err(err) => {
                warn!(node = %describe, error = %err, "failed to spawn process");

                // Nobody will read the upstream's output; close it so the
                // upstream process is not left blocked on a full pipe.
                if let Some((up, _)) = &upstream {
                    drop(up.take_output());
                }

                {
                    let mut st = self.node.lock();
                    st.process = Some(Process::Failed);
                    st.completion = Some(completion.clone());
                    st.phase = Phase::Started;
                }

                let exit = ExitOutcome::SpawnFailed(Arc::new(err));
                tokio::spawn(settle(tx, describe, exit, None, upstream_completion));
            }
        }

        Ok(completion)
    }
}

/// Start `node` as an upstream and, when `check_alive` is set, make sure its
/// output can still be read.
fn start_upstream(node: &Arc<Node>, check_alive: bool) -> Result<(Pipeline, Completion)> {
    let upstream = Pipeline::from_arc(Arc::clone(node));
    let (completion, fresh) = upstream.start_inner()?;

    // A node spawned by this very request is live by construction; one that
    // was started earlier may have exited in the meantime.
    if check_alive && !fresh && !node.is_alive() {
        return Err(StructuralError::AlreadyDead {
            node: node.describe(),
        }
        .into());
    }

    Ok((upstream, completion))
}

/// Whether a spawned process's output stream must be a managed pipe.
///
/// A pass-through (alias) downstream does not read the stream itself, so its
/// own output disposition decides.
fn pipes_output(output: &Output) -> bool {
    match output {
        Output::Inherit => false,
        Output::Piped => true,
        Output::Downstream(weak) => match weak.upgrade() {
            None => false,
            Some(node) => {
                let next = {
                    let st = node.lock();
                    match st.mode {
                        Mode::Aliased(_) => Some(st.stdout.clone()),
                        Mode::Direct => None,
                    }
                };
                match next {
                    Some(next) => pipes_output(&next),
                    None => true,
                }
            }
        },
    }
}

fn stdio(piped: bool) -> Stdio {
    if piped { Stdio::piped() } else { Stdio::inherit() }
}

/// An error view of this stream that has not started yet and may still be
/// handed to a sink.
fn claimable_view(output: &Output) -> Option<Weak<Node>> {
    let Output::Downstream(weak) = output else {
        return None;
    };
    let view = weak.upgrade()?;
    let st = view.lock();
    (st.mode == Mode::Aliased(StreamSelector::Stderr) && !st.is_started()).then(|| weak.clone())
}

/// Copy an error stream nobody reads onto our own stderr.
async fn drain_to_stderr(command: String, mut errors: ByteStream) {
    let mut stderr = tokio::io::stderr();
    match copy(&mut errors, &mut stderr).await {
        Ok(bytes) => debug!(node = %command, bytes, "error view drained to stderr"),
        Err(err) => debug!(node = %command, error = %err, "draining error view failed"),
    }
}

async fn settle(
    tx: SettlementSender,
    command: String,
    exit: ExitOutcome,
    feeder: Option<Feeder>,
    upstream: Option<Completion>,
) {
    let (stream, input_closed_early) = match feeder {
        Some(handle) => match handle.await {
            Ok(Ok(closed_early)) => (None, closed_early),
            Ok(Err(err)) => (Some(err), false),
            Err(join_err) => (
                Some(StreamError::Forward {
                    command: command.clone(),
                    source: Arc::new(std::io::Error::other(join_err.to_string())),
                }),
                false,
            ),
        },
        None => (None, false),
    };

    let upstream = match upstream {
        Some(completion) => Some(completion.wait().await),
        None => None,
    };

    debug!(node = %command, "completion settled");
    tx.send_replace(Some(Settlement {
        command,
        exit,
        upstream,
        stream,
        input_closed_early,
    }));
}

/// Copy an upstream's output into this process's stdin, then close it.
async fn forward(
    command: String,
    mut source: ByteStream,
    mut stdin: ChildStdin,
) -> std::result::Result<bool, StreamError> {
    match copy(&mut source, &mut stdin).await {
        Ok(bytes) => debug!(node = %command, bytes, "forwarded upstream output"),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
            debug!(node = %command, "process closed its input early");
            return Ok(true);
        }
        Err(err) => {
            return Err(StreamError::Forward {
                command,
                source: Arc::new(err),
            });
        }
    }
    close_stdin(command, stdin).await
}

async fn feed_buffer(
    command: String,
    bytes: Vec<u8>,
    mut stdin: ChildStdin,
) -> std::result::Result<bool, StreamError> {
    match stdin.write_all(&bytes).await {
        Ok(()) => debug!(node = %command, bytes = bytes.len(), "fed stdin buffer"),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(true),
        Err(err) => {
            return Err(StreamError::Forward {
                command,
                source: Arc::new(err),
            });
        }
    }
    close_stdin(command, stdin).await
}

async fn close_stdin(
    command: String,
    mut stdin: ChildStdin,
) -> std::result::Result<bool, StreamError> {
    match stdin.shutdown().await {
        Ok(()) => Ok(false),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(true),
        Err(err) => Err(StreamError::Forward {
            command,
            source: Arc::new(err),
        }),
    }
}

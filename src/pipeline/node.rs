// src/pipeline/node.rs

//! The pipeline node model.
//!
//! A [`Pipeline`] is a cheap, cloneable handle over one [`Node`]. Nodes are
//! linked into a simple chain: each node holds its upstream strongly (through
//! its stdin configuration) and its downstream weakly (through its stdout /
//! stderr configuration), so a chain never forms a reference cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::io::{DuplexStream, duplex};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::oneshot;

use crate::args::{Arg, expand_args};
use crate::exec::{ByteStream, Completion};

/// Convenience for commands that take no arguments: `command("true", NO_ARGS)`.
pub const NO_ARGS: [&str; 0] = [];

/// Create a fresh root node running `name` with the given arguments.
///
/// Every call returns an independent node; nothing is shared between roots.
pub fn command<I, A>(name: impl Into<String>, args: I) -> Pipeline
where
    I: IntoIterator<Item = A>,
    A: Into<Arg>,
{
    Pipeline::new(name, args)
}

/// Which standard stream of a process a node exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    Stdout,
    Stderr,
}

/// Observable lifecycle of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No command and nothing to alias; cannot be started.
    Unconfigured,
    /// Ready to start; links and policies may still change.
    Configured,
    /// `start()` is wiring upstream nodes.
    Starting,
    /// A process is running (or aliased); completion not settled yet.
    Started,
    /// Completion has settled.
    Settled,
}

/// Where a node's standard input comes from.
#[derive(Debug, Clone)]
pub(crate) enum Input {
    Inherit,
    Buffer(Vec<u8>),
    Upstream(Arc<Node>),
}

/// Where a node's standard output / error goes.
#[derive(Debug, Clone)]
pub(crate) enum Output {
    Inherit,
    Piped,
    Downstream(Weak<Node>),
}

impl Output {
    /// The live downstream node this output feeds, if any.
    pub(crate) fn downstream(&self) -> Option<Arc<Node>> {
        match self {
            Output::Downstream(w) => w.upgrade(),
            _ => None,
        }
    }
}

/// Configured role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Spawns its own process.
    Direct,
    /// Exposes one stream of its upstream's process instead of spawning.
    Aliased(StreamSelector),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Starting,
    Started,
}

/// Process slot, filled once the node has been started.
#[derive(Debug)]
pub(crate) enum Process {
    Spawned(SpawnedProcess),
    Aliased {
        target: Arc<Node>,
        stream: StreamSelector,
    },
    /// Spawning failed at the OS level; there is no process.
    Failed,
}

/// Buffer between an error stream relay and the view that claims it.
const TAP_CAPACITY: usize = 64 * 1024;

/// A spawned process's error stream, as handed to whoever claims it.
#[derive(Debug)]
pub(crate) enum ErrorStream {
    /// Plain pipe, read directly.
    Pipe(ChildStderr),
    /// Held by a relay task until a view claims it (see `exec::tap`).
    Tapped(oneshot::Sender<DuplexStream>),
}

impl ErrorStream {
    fn claim(self) -> Option<ByteStream> {
        match self {
            ErrorStream::Pipe(pipe) => Some(Box::new(pipe)),
            ErrorStream::Tapped(relay) => {
                let (reader, writer) = duplex(TAP_CAPACITY);
                relay.send(writer).ok()?;
                Some(Box::new(reader))
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct SpawnedProcess {
    pub(crate) pid: Option<u32>,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ErrorStream>,
    pub(crate) exited: Arc<AtomicBool>,
}

#[derive(Debug)]
pub(crate) struct NodeInner {
    pub(crate) stdin: Input,
    pub(crate) stdout: Output,
    pub(crate) stderr: Output,
    pub(crate) throw_on_error: bool,
    pub(crate) mode: Mode,
    pub(crate) phase: Phase,
    pub(crate) process: Option<Process>,
    pub(crate) completion: Option<Completion>,
}

impl NodeInner {
    pub(crate) fn is_started(&self) -> bool {
        self.phase != Phase::Idle
    }
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) command: Option<String>,
    pub(crate) args: Vec<String>,
    pub(crate) state: Mutex<NodeInner>,
    /// Serializes `start()` on this node. Always taken downstream → upstream.
    pub(crate) start_guard: Mutex<()>,
}

impl Node {
    pub(crate) fn new(command: Option<String>, args: Vec<String>, mode: Mode) -> Self {
        Self {
            command,
            args,
            state: Mutex::new(NodeInner {
                stdin: Input::Inherit,
                stdout: Output::Inherit,
                stderr: Output::Inherit,
                throw_on_error: true,
                mode,
                phase: Phase::Idle,
                process: None,
                completion: None,
            }),
            start_guard: Mutex::new(()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn describe(&self) -> String {
        match &self.command {
            Some(cmd) if self.args.is_empty() => cmd.clone(),
            Some(cmd) => format!("{} {}", cmd, self.args.join(" ")),
            None => "null shell".to_string(),
        }
    }

    /// Take one of this node's exposed streams, resolving aliases.
    pub(crate) fn take_stream(&self, selector: StreamSelector) -> Option<ByteStream> {
        let alias = {
            let mut st = self.lock();
            match st.process.as_mut()? {
                Process::Spawned(p) => {
                    return match selector {
                        StreamSelector::Stdout => {
                            p.stdout.take().map(|s| Box::new(s) as ByteStream)
                        }
                        StreamSelector::Stderr => p.stderr.take().and_then(ErrorStream::claim),
                    };
                }
                Process::Aliased { target, stream } => (Arc::clone(target), *stream),
                Process::Failed => return None,
            }
        };

        // An alias only has the one stream it views.
        if selector != StreamSelector::Stdout {
            return None;
        }
        let (target, stream) = alias;
        target.take_stream(stream)
    }

    /// Whether the process backing this node is still running, as far as
    /// the engine has observed.
    pub(crate) fn is_alive(&self) -> bool {
        let target = {
            let st = self.lock();
            match &st.process {
                Some(Process::Spawned(p)) => return !p.exited.load(Ordering::SeqCst),
                Some(Process::Aliased { target, .. }) => Arc::clone(target),
                Some(Process::Failed) | None => return false,
            }
        };
        target.is_alive()
    }
}

/// Handle to one node of a pipeline.
///
/// Clones refer to the same node. Awaiting a `Pipeline` (or calling
/// [`Pipeline::run`]) starts it and waits for its completion.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) node: Arc<Node>,
}

impl Pipeline {
    /// A root node running `name` with expanded `args`.
    pub fn new<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Self::from_node(Node::new(Some(name.into()), expand_args(args), Mode::Direct))
    }

    /// A bare command-less node. It only carries policy: nodes linked from
    /// it inherit its flags but are not connected to it.
    pub fn identity() -> Self {
        Self::from_node(Node::new(None, Vec::new(), Mode::Direct))
    }

    pub(crate) fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
        }
    }

    pub(crate) fn from_arc(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub fn command(&self) -> Option<&str> {
        self.node.command.as_deref()
    }

    pub fn args(&self) -> &[String] {
        &self.node.args
    }

    pub fn throws_on_error(&self) -> bool {
        self.node.lock().throw_on_error
    }

    /// OS process id, once this node has spawned its own process.
    pub fn pid(&self) -> Option<u32> {
        match &self.node.lock().process {
            Some(Process::Spawned(p)) => p.pid,
            _ => None,
        }
    }

    /// Whether both handles refer to the same node.
    pub fn same_node(&self, other: &Pipeline) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    pub fn state(&self) -> NodeState {
        let st = self.node.lock();
        match st.phase {
            Phase::Idle => {
                if self.node.command.is_none() && st.mode == Mode::Direct {
                    NodeState::Unconfigured
                } else {
                    NodeState::Configured
                }
            }
            Phase::Starting => NodeState::Starting,
            Phase::Started => match &st.completion {
                Some(c) if c.is_settled() => NodeState::Settled,
                _ => NodeState::Started,
            },
        }
    }

    /// Take this node's output stream after it has been started.
    pub(crate) fn take_output(&self) -> Option<ByteStream> {
        self.node.take_stream(StreamSelector::Stdout)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("command", &self.node.command)
            .field("args", &self.node.args)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node.describe())
    }
}

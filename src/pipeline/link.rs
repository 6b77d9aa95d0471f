// src/pipeline/link.rs

//! Linking nodes into a chain and deriving policy / stream-view nodes.
//!
//! All of these operations only touch configuration; nothing is spawned
//! until a node is started. Once a node has started, every operation here
//! fails with `AlreadyStarted`.

use std::sync::{Arc, MutexGuard};

use tracing::debug;

use crate::args::{Arg, expand_args};
use crate::errors::{Result, StructuralError};
use crate::pipeline::node::{
    Input, Mode, Node, NodeInner, Output, Pipeline, StreamSelector,
};

/// Where a link goes.
#[derive(Debug, Clone)]
pub enum Destination {
    /// A new command node, built from a command name and arguments.
    Command { name: String, args: Vec<String> },
    /// An existing node.
    Node(Pipeline),
}

impl Destination {
    pub fn command<I, A>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        Destination::Command {
            name: name.into(),
            args: expand_args(args),
        }
    }
}

impl From<&str> for Destination {
    fn from(name: &str) -> Self {
        Destination::Command {
            name: name.to_string(),
            args: Vec::new(),
        }
    }
}

impl From<String> for Destination {
    fn from(name: String) -> Self {
        Destination::Command {
            name,
            args: Vec::new(),
        }
    }
}

impl From<Pipeline> for Destination {
    fn from(node: Pipeline) -> Self {
        Destination::Node(node)
    }
}

impl From<&Pipeline> for Destination {
    fn from(node: &Pipeline) -> Self {
        Destination::Node(node.clone())
    }
}

fn already_started(node: &Node) -> StructuralError {
    StructuralError::AlreadyStarted {
        node: node.describe(),
    }
}

fn invalid_destination(node: &Node, reason: &str) -> StructuralError {
    StructuralError::InvalidDestination {
        node: node.describe(),
        reason: reason.to_string(),
    }
}

/// Lock two distinct nodes in a fixed (address) order.
fn lock_pair<'a>(
    a: &'a Node,
    b: &'a Node,
) -> (MutexGuard<'a, NodeInner>, MutexGuard<'a, NodeInner>) {
    if (a as *const Node) < (b as *const Node) {
        let ga = a.lock();
        let gb = b.lock();
        (ga, gb)
    } else {
        let gb = b.lock();
        let ga = a.lock();
        (ga, gb)
    }
}

impl Pipeline {
    fn ensure_not_started(&self) -> Result<()> {
        if self.node.lock().is_started() {
            return Err(already_started(&self.node).into());
        }
        Ok(())
    }

    /// Link this node's output to `destination` and return the downstream
    /// node.
    pub fn link(&self, destination: impl Into<Destination>) -> Result<Pipeline> {
        self.ensure_not_started()?;

        match destination.into() {
            Destination::Command { name, args } => {
                let next = Pipeline::from_node(Node::new(Some(name), args, Mode::Direct));
                self.link_node(&next)?;
                Ok(next)
            }
            Destination::Node(next) => {
                self.link_node(&next)?;
                Ok(next)
            }
        }
    }

    /// Link to a new command node: `command("echo", ["hi"]).pipe("sed", ["s/hi/yo/"])`.
    pub fn pipe<I, A>(&self, name: impl Into<String>, args: I) -> Result<Pipeline>
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.link(Destination::command(name, args))
    }

    /// Hand this node and extra arguments to a custom transform.
    pub fn link_with<F, T, I, A>(&self, transform: F, args: I) -> Result<T>
    where
        F: FnOnce(&Pipeline, Vec<String>) -> T,
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.ensure_not_started()?;
        Ok(transform(self, expand_args(args)))
    }

    fn link_node(&self, next: &Pipeline) -> Result<()> {
        if self.same_node(next) {
            return Err(invalid_destination(&next.node, "cannot link a node to itself").into());
        }

        let (mut src, mut dst) = lock_pair(&self.node, &next.node);

        if src.is_started() {
            return Err(already_started(&self.node).into());
        }
        if dst.is_started() {
            return Err(already_started(&next.node).into());
        }

        // A bare identity node has no output: it only passes its policy on.
        let connect = self.node.command.is_some() || src.mode != Mode::Direct;

        if connect {
            if src.stdout.downstream().is_some() {
                return Err(invalid_destination(
                    &next.node,
                    "source already feeds another node",
                )
                .into());
            }
            if !matches!(dst.stdin, Input::Inherit) || dst.mode != Mode::Direct {
                return Err(
                    invalid_destination(&next.node, "destination already has an input").into(),
                );
            }
            if next.node.command.is_none() {
                return Err(
                    invalid_destination(&next.node, "destination has no command").into(),
                );
            }
        }

        dst.throw_on_error = src.throw_on_error;

        if connect {
            src.stdout = Output::Downstream(Arc::downgrade(&next.node));
            dst.stdin = Input::Upstream(Arc::clone(&self.node));
            debug!(from = %self, to = %next, "linked nodes");
        }

        Ok(())
    }

    /// Derive a pass-through node with the given throw-on-error policy.
    ///
    /// The original node is not modified; further links continue from the
    /// returned node.
    pub fn throw_on_error(&self, value: bool) -> Result<Pipeline> {
        let mut src = self.node.lock();
        if src.is_started() {
            return Err(already_started(&self.node).into());
        }

        let connect = self.node.command.is_some() || src.mode != Mode::Direct;
        let next = if connect {
            if src.stdout.downstream().is_some() {
                return Err(invalid_destination(
                    &self.node,
                    "source already feeds another node",
                )
                .into());
            }
            let next = Pipeline::from_node(Node::new(
                None,
                Vec::new(),
                Mode::Aliased(StreamSelector::Stdout),
            ));
            src.stdout = Output::Downstream(Arc::downgrade(&next.node));
            next.node.lock().stdin = Input::Upstream(Arc::clone(&self.node));
            next
        } else {
            Pipeline::identity()
        };

        next.node.lock().throw_on_error = value;
        debug!(node = %self, throw_on_error = value, "derived policy node");
        Ok(next)
    }

    /// A sibling node exposing only this node's error stream.
    ///
    /// Running it spawns nothing of its own: it views the stderr of the one
    /// process spawned for this node.
    pub fn error_view(&self) -> Result<Pipeline> {
        let mut src = self.node.lock();
        if src.is_started() {
            return Err(already_started(&self.node).into());
        }
        if self.node.command.is_none() {
            return Err(StructuralError::InvalidShell {
                node: self.node.describe(),
            }
            .into());
        }
        if src.mode != Mode::Direct {
            return Err(invalid_destination(
                &self.node,
                "an alias node has no error stream of its own",
            )
            .into());
        }
        if src.stderr.downstream().is_some() {
            return Err(
                invalid_destination(&self.node, "error stream is already viewed").into(),
            );
        }

        let view = Pipeline::from_node(Node::new(
            self.node.command.clone(),
            self.node.args.clone(),
            Mode::Aliased(StreamSelector::Stderr),
        ));
        {
            let mut st = view.node.lock();
            st.stdin = Input::Upstream(Arc::clone(&self.node));
            st.throw_on_error = src.throw_on_error;
        }
        src.stderr = Output::Downstream(Arc::downgrade(&view.node));

        debug!(node = %self, "created error stream view");
        Ok(view)
    }

    /// Feed a fixed buffer into this node's standard input.
    pub fn with_stdin(&self, bytes: impl Into<Vec<u8>>) -> Result<Pipeline> {
        let mut st = self.node.lock();
        if st.is_started() {
            return Err(already_started(&self.node).into());
        }
        if self.node.command.is_none() || st.mode != Mode::Direct {
            return Err(invalid_destination(&self.node, "node has no input of its own").into());
        }
        if let Input::Upstream(_) = st.stdin {
            return Err(
                invalid_destination(&self.node, "node is already fed by an upstream").into(),
            );
        }
        st.stdin = Input::Buffer(bytes.into());
        drop(st);
        Ok(self.clone())
    }
}

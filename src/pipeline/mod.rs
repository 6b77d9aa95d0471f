// src/pipeline/mod.rs

//! Declarative pipelines of external commands.
//!
//! ```no_run
//! # async fn demo() -> pipewright::errors::Result<()> {
//! use pipewright::command;
//!
//! let text = command("echo", ["hello"])
//!     .pipe("sed", ["s/hello/hi/"])?
//!     .collect_string()
//!     .await?;
//! assert_eq!(text, "hi\n");
//! # Ok(())
//! # }
//! ```
//!
//! - [`node`] defines the node model and the `command` factory.
//! - [`link`] connects nodes and derives policy / error-stream nodes.
//! - [`sink`] holds the file, string and per-record output adapters.
//!
//! Starting and waiting lives in [`crate::exec`].

pub mod link;
pub mod node;
pub mod sink;

use std::future::{Future, IntoFuture};
use std::pin::Pin;

pub use link::Destination;
pub use node::{NO_ARGS, NodeState, Pipeline, StreamSelector, command};

use crate::errors::Result;
use crate::exec::ExitValue;

impl IntoFuture for Pipeline {
    type Output = Result<ExitValue>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.run().await })
    }
}

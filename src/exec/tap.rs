// src/exec/tap.rs

//! Error stream relay for views that are not claimed yet.
//!
//! An error view may be handed to a sink after its source process was
//! spawned. The source's stderr is then piped into a relay task that keeps
//! the bytes until the view claims them, so the process never blocks on a
//! full pipe. If the view goes away unclaimed, the bytes go to our own
//! stderr instead, which is where they would have gone without a view.

use std::sync::Weak;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, copy};
use tokio::process::ChildStderr;
use tokio::sync::oneshot;
use tracing::debug;

use crate::pipeline::node::Node;

const CHUNK: usize = 8 * 1024;

pub(crate) async fn relay_stderr(
    command: String,
    mut source: ChildStderr,
    mut claim: oneshot::Receiver<DuplexStream>,
    view: Weak<Node>,
) {
    let mut held = Vec::new();
    let mut chunk = vec![0u8; CHUNK];
    let mut claimable = true;

    loop {
        tokio::select! {
            claimed = &mut claim, if claimable => match claimed {
                Ok(sink) => return hand_over(&command, held, source, sink).await,
                // The source node is gone; nobody can claim any more.
                Err(_) => claimable = false,
            },
            read = source.read(&mut chunk) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    held.extend_from_slice(&chunk[..n]);
                    if !claimable || view.upgrade().is_none() {
                        release(&command, &mut held).await;
                    }
                }
            },
        }
    }

    if claimable && view.upgrade().is_some() {
        if let Ok(sink) = claim.await {
            if let Some(mut sink) = sink_held(&command, held, sink).await {
                let _ = sink.shutdown().await;
            }
            return;
        }
    }
    release(&command, &mut held).await;
}

async fn hand_over(command: &str, held: Vec<u8>, mut source: ChildStderr, sink: DuplexStream) {
    let Some(mut sink) = sink_held(command, held, sink).await else {
        return;
    };
    match copy(&mut source, &mut sink).await {
        Ok(bytes) => debug!(node = %command, bytes, "relayed error stream"),
        Err(err) => debug!(node = %command, error = %err, "error stream reader went away"),
    }
    let _ = sink.shutdown().await;
}

/// Write what was held so far into the claiming view's stream.
async fn sink_held(command: &str, held: Vec<u8>, mut sink: DuplexStream) -> Option<DuplexStream> {
    debug!(node = %command, bytes = held.len(), "error view claimed");
    sink.write_all(&held).await.ok()?;
    Some(sink)
}

/// Send held bytes to our own stderr.
async fn release(command: &str, held: &mut Vec<u8>) {
    if held.is_empty() {
        return;
    }
    debug!(node = %command, bytes = held.len(), "error view unclaimed; writing to stderr");
    let mut stderr = tokio::io::stderr();
    let _ = stderr.write_all(held).await;
    let _ = stderr.flush().await;
    held.clear();
}

// src/pipeline/sink.rs

//! Sink adapters: terminal consumers of a node's output stream.
//!
//! Each adapter claims the node's stdout as a managed pipe, starts the node
//! and drains the stream concurrently with waiting on the node's completion.
//! The adapter resolves once both sides are done. Sink-side I/O failures are
//! always reported, whatever the node's throw-on-error policy; they also take
//! precedence over the process outcome, since a failing sink closes its end
//! of the pipe and the process may die from that.
//!
//! Files are opened only once the node has started, so a pipeline that
//! cannot start leaves an existing file untouched. Output is decoded as
//! UTF-8 lossily; invalid bytes become `U+FFFD`.

use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, copy};
use tracing::debug;

use crate::errors::{Result, StreamError, StructuralError};
use crate::exec::{ByteStream, Completion, ExitValue};
use crate::pipeline::node::{Output, Pipeline};

fn sink_error(sink: &str, err: io::Error) -> StreamError {
    StreamError::Sink {
        sink: sink.to_string(),
        source: Arc::new(err),
    }
}

impl Pipeline {
    /// Route stdout into a managed pipe, start, and take the stream.
    fn claim_output(&self) -> Result<(Completion, Option<ByteStream>)> {
        {
            let mut st = self.node.lock();
            if st.is_started() {
                return Err(StructuralError::AlreadyStarted {
                    node: self.node.describe(),
                }
                .into());
            }
            st.stdout = Output::Piped;
        }

        let completion = self.start()?;
        Ok((completion, self.take_output()))
    }

    /// Claim stdout, start, and run `consume` against the output stream.
    async fn drive<T, F, Fut>(&self, consume: F) -> Result<(ExitValue, T)>
    where
        F: FnOnce(Option<ByteStream>) -> Fut,
        Fut: Future<Output = std::result::Result<T, StreamError>>,
    {
        let (completion, stream) = self.claim_output()?;

        let (exit, sunk) = tokio::join!(completion.wait(), consume(stream));
        let sunk = sunk?;
        Ok((exit?, sunk))
    }

    /// Append the output to `path` (like `>>`), creating it if needed.
    pub async fn append_to_file(&self, path: impl AsRef<Path>) -> Result<ExitValue> {
        let path = path.as_ref();
        let sink = format!("append to {}", path.display());

        let (exit, ()) = self
            .drive(|stream| async move {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|e| sink_error(&sink, e))?;
                drain_into_file(stream, file, &sink).await
            })
            .await?;
        Ok(exit)
    }

    /// Write the output to `path` (like `>`), truncating it first.
    pub async fn write_to_file(&self, path: impl AsRef<Path>) -> Result<ExitValue> {
        let path = path.as_ref();
        let sink = format!("write to {}", path.display());

        let (exit, ()) = self
            .drive(|stream| async move {
                let file = File::create(path).await.map_err(|e| sink_error(&sink, e))?;
                drain_into_file(stream, file, &sink).await
            })
            .await?;
        Ok(exit)
    }

    /// Collect the whole output into a string.
    pub async fn collect_string(&self) -> Result<String> {
        let (_, text) = self
            .drive(|stream| async move {
                let mut buf = Vec::new();
                if let Some(mut stream) = stream {
                    stream
                        .read_to_end(&mut buf)
                        .await
                        .map_err(|e| sink_error("string", e))?;
                }
                Ok(String::from_utf8_lossy(&buf).into_owned())
            })
            .await?;
        Ok(text)
    }

    /// Call `f` for every output line, in arrival order.
    pub async fn for_each_record<F>(&self, f: F) -> Result<ExitValue>
    where
        F: FnMut(String),
    {
        let (exit, count) = self
            .drive(|stream| read_records(stream, f))
            .await?;
        debug!(node = %self, records = count, "record sink finished");
        Ok(exit)
    }

    /// Apply `f` to every output line and collect the results in order.
    pub async fn map_records<T, F>(&self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(String) -> T,
    {
        let mut out = Vec::new();
        self.for_each_record(|line| out.push(f(line))).await?;
        Ok(out)
    }

    /// Every output line, unmodified.
    pub async fn lines(&self) -> Result<Vec<String>> {
        self.map_records(|line| line).await
    }
}

async fn drain_into_file(
    stream: Option<ByteStream>,
    mut file: File,
    sink: &str,
) -> std::result::Result<(), StreamError> {
    if let Some(mut stream) = stream {
        let bytes = copy(&mut stream, &mut file)
            .await
            .map_err(|e| sink_error(sink, e))?;
        debug!(sink = %sink, bytes, "drained output into file");
    }
    file.flush().await.map_err(|e| sink_error(sink, e))?;
    Ok(())
}

/// Feed newline-delimited records to `f`; returns how many were seen.
async fn read_records<F>(
    stream: Option<ByteStream>,
    mut f: F,
) -> std::result::Result<usize, StreamError>
where
    F: FnMut(String),
{
    let Some(stream) = stream else {
        return Ok(0);
    };

    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .await
            .map_err(|e| sink_error("records", e))?;
        if read == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        f(String::from_utf8_lossy(&buf).into_owned());
        count += 1;
    }
    Ok(count)
}

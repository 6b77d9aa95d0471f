// src/runner.rs

//! Build and run a pipeline described by a validated [`ConfigFile`].

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{ConfigFile, SinkKind};
use crate::errors;
use crate::exec::ExitValue;
use crate::pipeline::{Destination, Pipeline};

/// Turn the configured stages into a linked chain and return its tail.
pub fn build_pipeline(cfg: &ConfigFile) -> errors::Result<Pipeline> {
    // The policy carrier: every stage linked from it inherits the flag.
    let mut tail = Pipeline::identity().throw_on_error(cfg.config.throw_on_error)?;
    // The previous command node and its own policy override.
    let mut last_command: Option<(Pipeline, Option<bool>)> = None;

    for stage in &cfg.stage {
        let dest = Destination::command(&stage.cmd, &stage.args);
        let node = match (&last_command, stage.stderr) {
            (Some((prev, over)), true) => {
                let view = prev.error_view()?;
                let view = match over {
                    Some(value) => view.throw_on_error(*value)?,
                    None => view,
                };
                view.link(dest)?
            }
            _ => tail.link(dest)?,
        };
        debug!(stage = %node, stderr = stage.stderr, "added stage");

        tail = match stage.throw_on_error {
            Some(value) => node.throw_on_error(value)?,
            None => node.clone(),
        };
        last_command = Some((node, stage.throw_on_error));
    }

    Ok(tail)
}

/// Run the pipeline into the configured sink and return the tail's exit value.
pub async fn execute(cfg: &ConfigFile) -> Result<ExitValue> {
    let pipeline = build_pipeline(cfg).context("building pipeline")?;
    info!(pipeline = %pipeline, sink = ?cfg.sink.kind, "running pipeline");

    let path = cfg.sink.path.as_deref().unwrap_or_default();
    let exit = match cfg.sink.kind {
        SinkKind::Inherit => pipeline.run().await?,
        SinkKind::Write => pipeline
            .write_to_file(path)
            .await
            .with_context(|| format!("writing pipeline output to {path:?}"))?,
        SinkKind::Append => pipeline
            .append_to_file(path)
            .await
            .with_context(|| format!("appending pipeline output to {path:?}"))?,
        SinkKind::String => {
            let text = pipeline.collect_string().await?;
            print!("{text}");
            // Already settled; this only reads the cached outcome.
            pipeline.run().await?
        }
        SinkKind::Lines => {
            for line in pipeline.lines().await? {
                println!("{line}");
            }
            pipeline.run().await?
        }
    };

    info!(exit = %exit, "pipeline finished");
    Ok(exit)
}

/// Process exit code for a pipeline result.
pub fn exit_code(exit: &ExitValue) -> i32 {
    match exit {
        ExitValue::Code(code) => *code,
        ExitValue::Signal(_) => 1,
    }
}

/// Human-readable description of the configured chain.
pub fn describe(cfg: &ConfigFile) -> String {
    let mut out = String::new();
    out.push_str("pipewright dry-run\n");
    out.push_str(&format!(
        "  config.throw_on_error = {}\n\n",
        cfg.config.throw_on_error
    ));

    out.push_str(&format!("stages ({}):\n", cfg.stage.len()));
    for (idx, stage) in cfg.stage.iter().enumerate() {
        out.push_str(&format!("  {}. {}", idx + 1, stage.cmd));
        for arg in &stage.args {
            out.push_str(&format!(" {arg:?}"));
        }
        out.push('\n');
        if stage.stderr {
            out.push_str("      input: stderr of previous stage\n");
        }
        if let Some(value) = stage.throw_on_error {
            out.push_str(&format!("      throw_on_error: {value}\n"));
        }
    }

    out.push_str(&format!("sink: {:?}", cfg.sink.kind));
    if let Some(path) = &cfg.sink.path {
        out.push_str(&format!(" -> {path}"));
    }
    out.push('\n');
    out
}

// tests/pipeline_exec.rs

mod common;
use crate::common::{init_tracing, sh, with_timeout};

use std::error::Error;

use pipewright::errors::{PipelineError, ProcessError, StreamError, StructuralError};
use pipewright::{ExitValue, NO_ARGS, NodeState, Pipeline, command};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn echo_through_sed_collects_rewritten_text() -> TestResult {
    with_timeout(async {
        init_tracing();

        let text = command("echo", ["hello"])
            .pipe("sed", ["s/hello/hi/"])?
            .collect_string()
            .await?;

        assert_eq!(text, "hi\n");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn three_stage_chain_streams_through_every_process() -> TestResult {
    with_timeout(async {
        init_tracing();

        let lines = command("printf", ["b\\na\\nc\\n"])
            .pipe("sort", NO_ARGS)?
            .pipe("head", ["-n", "2"])?
            .lines()
            .await?;

        assert_eq!(lines, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn start_twice_spawns_once_and_returns_same_result() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("runs");
        let node = sh(&format!("echo run >> '{}'", marker.display()));

        let first = node.start()?;
        let pid = node.pid();
        let second = node.start()?;

        assert!(pid.is_some());
        assert_eq!(node.pid(), pid);
        assert_eq!(first.wait().await?, ExitValue::Code(0));
        assert_eq!(second.wait().await?, ExitValue::Code(0));

        // A third request after settling is still served from the cache.
        assert_eq!(node.run().await?, ExitValue::Code(0));

        let runs = std::fs::read_to_string(&marker)?;
        assert_eq!(runs, "run\n");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn nonzero_exit_rejects_by_default() -> TestResult {
    with_timeout(async {
        init_tracing();

        match sh("exit 2").run().await {
            Err(PipelineError::Process(ProcessError::NonZeroExit { code, .. })) => {
                assert_eq!(code, 2);
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn nonzero_exit_resolves_with_code_when_suppressed() -> TestResult {
    with_timeout(async {
        init_tracing();

        let exit = sh("exit 2").throw_on_error(false)?.run().await?;
        assert_eq!(exit, ExitValue::Code(2));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn error_message_mentions_exit_code() -> TestResult {
    with_timeout(async {
        init_tracing();

        let err = sh("exit 2").run().await.expect_err("should fail");
        let msg = err.to_string();
        assert!(msg.contains("code 2"), "unexpected message: {msg}");
        assert!(err.is_process());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn signal_termination_rejects_with_signal_name() -> TestResult {
    with_timeout(async {
        init_tracing();

        match sh("kill -TERM $$").run().await {
            Err(PipelineError::Process(ProcessError::SignalTermination { signal, .. })) => {
                assert_eq!(signal, "SIGTERM");
            }
            other => panic!("expected SignalTermination, got {:?}", other),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn signal_termination_resolves_with_name_when_suppressed() -> TestResult {
    with_timeout(async {
        init_tracing();

        let exit = sh("kill -TERM $$").throw_on_error(false)?.run().await?;
        assert_eq!(exit, ExitValue::Signal("SIGTERM".to_string()));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn spawn_failure_rejects_or_resolves_with_os_code() -> TestResult {
    with_timeout(async {
        init_tracing();

        match command("pipewright-no-such-program", NO_ARGS).run().await {
            Err(PipelineError::Process(ProcessError::SpawnFailure { source, .. })) => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected SpawnFailure, got {:?}", other),
        }

        let exit = command("pipewright-no-such-program", NO_ARGS)
            .throw_on_error(false)?
            .run()
            .await?;
        // ENOENT
        assert_eq!(exit, ExitValue::Code(2));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn upstream_failure_fails_the_downstream() -> TestResult {
    with_timeout(async {
        init_tracing();

        let tail = sh("echo partial; exit 3").pipe("cat", NO_ARGS)?;
        match tail.run().await {
            Err(PipelineError::Process(ProcessError::NonZeroExit { code, command })) => {
                assert_eq!(code, 3);
                assert!(command.starts_with("sh"), "unexpected command: {command}");
            }
            other => panic!("expected upstream NonZeroExit, got {:?}", other),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn suppressed_policy_flows_down_the_chain() -> TestResult {
    with_timeout(async {
        init_tracing();

        let tail = sh("exit 4")
            .throw_on_error(false)?
            .pipe("sh", ["-c", "cat >/dev/null; exit 5"])?;

        assert!(!tail.throws_on_error());
        assert_eq!(tail.run().await?, ExitValue::Code(5));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn starting_after_upstream_exited_fails_already_dead() -> TestResult {
    with_timeout(async {
        init_tracing();

        let head = command("echo", ["hi"]);
        let tail = head.pipe("cat", NO_ARGS)?;

        head.run().await?;

        match tail.run().await {
            Err(PipelineError::Structural(StructuralError::AlreadyDead { node })) => {
                assert!(node.starts_with("echo"));
            }
            other => panic!("expected AlreadyDead, got {:?}", other),
        }
        Ok(())
    })
    .await
}

#[test]
fn completion_outliving_its_runtime_names_the_command() -> TestResult {
    init_tracing();

    let node = command("sleep", ["5"]);
    let completion = {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async { node.start() })?
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    match runtime.block_on(completion.wait()) {
        Err(PipelineError::Stream(StreamError::Abandoned { command })) => {
            assert!(command.starts_with("sleep"), "unexpected command: {command}");
        }
        other => panic!("expected Abandoned, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn command_less_node_cannot_start() -> TestResult {
    with_timeout(async {
        init_tracing();

        let node = Pipeline::identity();
        assert_eq!(node.state(), NodeState::Unconfigured);

        match node.start() {
            Err(PipelineError::Structural(StructuralError::InvalidShell { .. })) => {}
            other => panic!("expected InvalidShell, got {:?}", other),
        }
        Ok(())
    })
    .await
}

#[tokio::test]
async fn state_moves_from_configured_to_settled() -> TestResult {
    with_timeout(async {
        init_tracing();

        let node = command("true", NO_ARGS);
        assert_eq!(node.state(), NodeState::Configured);

        let completion = node.start()?;
        assert!(matches!(
            node.state(),
            NodeState::Started | NodeState::Settled
        ));

        completion.wait().await?;
        assert_eq!(node.state(), NodeState::Settled);
        assert!(completion.is_settled());
        Ok(())
    })
    .await
}

#[tokio::test]
async fn stdin_buffer_feeds_the_first_process() -> TestResult {
    with_timeout(async {
        init_tracing();

        let text = command("cat", NO_ARGS)
            .with_stdin("abc")?
            .pipe("tr", ["a-z", "A-Z"])?
            .collect_string()
            .await?;

        assert_eq!(text, "ABC");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn pipelines_and_completions_are_awaitable() -> TestResult {
    with_timeout(async {
        init_tracing();

        let exit = command("true", NO_ARGS).await?;
        assert!(exit.is_success());

        let completion = command("true", NO_ARGS).start()?;
        assert_eq!(completion.await?, ExitValue::Code(0));
        Ok(())
    })
    .await
}

#[tokio::test]
async fn downstream_closing_early_does_not_fail_forwarding() -> TestResult {
    with_timeout(async {
        init_tracing();

        let lines = sh("for i in 1 2 3 4 5; do echo $i; done")
            .pipe("head", ["-n", "1"])?
            .lines()
            .await?;

        assert_eq!(lines, vec!["1".to_string()]);
        Ok(())
    })
    .await
}

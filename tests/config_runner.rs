// tests/config_runner.rs

mod common;
use crate::common::builders::{ConfigFileBuilder, StageConfigBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::io::Write;

use pipewright::cli::CliArgs;
use pipewright::config::{ConfigFile, SinkKind, load_and_validate};
use pipewright::errors::ConfigError;
use pipewright::runner::{build_pipeline, describe, execute, exit_code};
use pipewright::ExitValue;
use tempfile::NamedTempFile;

type TestResult = Result<(), Box<dyn Error>>;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn loads_stages_and_sink_from_toml() {
    let file = write_config(
        r#"
[config]
throw_on_error = false

[[stage]]
cmd = "echo"
args = ["hello"]

[[stage]]
cmd = "sed"
args = ["s/hello/hi/"]
throw_on_error = true

[sink]
kind = "append"
path = "hellos"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert!(!cfg.config.throw_on_error);
    assert_eq!(cfg.stage.len(), 2);
    assert_eq!(cfg.stage[0].cmd, "echo");
    assert_eq!(cfg.stage[1].throw_on_error, Some(true));
    assert_eq!(cfg.sink.kind, SinkKind::Append);
    assert_eq!(cfg.sink.path.as_deref(), Some("hellos"));
}

#[test]
fn defaults_apply_when_sections_are_missing() {
    let file = write_config(
        r#"
[[stage]]
cmd = "true"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();
    assert!(cfg.config.throw_on_error);
    assert!(cfg.stage[0].args.is_empty());
    assert!(!cfg.stage[0].stderr);
    assert_eq!(cfg.sink.kind, SinkKind::Inherit);
}

#[test]
fn empty_pipeline_is_rejected() {
    let file = write_config("[config]\nthrow_on_error = true\n");

    match load_and_validate(file.path()) {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("at least one")),
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
fn first_stage_cannot_read_stderr() {
    let result = ConfigFile::try_from(
        ConfigFileBuilder::new()
            .with_stage(StageConfigBuilder::new("echo").stderr(true).build())
            .raw(),
    );

    match result {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("stderr")),
        other => panic!("expected Invalid, got {:?}", other),
    }
}

#[test]
fn file_sinks_require_a_path_and_others_reject_one() {
    let missing = ConfigFile::try_from(
        ConfigFileBuilder::new()
            .with_stage(StageConfigBuilder::new("echo").build())
            .sink(SinkKind::Write, None)
            .raw(),
    );
    match missing {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("requires a `path`")),
        other => panic!("expected Invalid, got {:?}", other),
    }

    let extra = ConfigFile::try_from(
        ConfigFileBuilder::new()
            .with_stage(StageConfigBuilder::new("echo").build())
            .sink(SinkKind::Lines, Some("out.txt"))
            .raw(),
    );
    assert!(matches!(extra, Err(ConfigError::Invalid(_))));
}

#[test]
fn unknown_sink_kind_is_a_toml_error() {
    let file = write_config(
        r#"
[[stage]]
cmd = "true"

[sink]
kind = "socket"
"#,
    );

    assert!(matches!(
        load_and_validate(file.path()),
        Err(ConfigError::Toml(_))
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        load_and_validate(dir.path().join("Pipewright.toml")),
        Err(ConfigError::Io(_))
    ));
}

#[test]
fn build_pipeline_applies_policy_overrides() -> TestResult {
    let cfg = ConfigFileBuilder::new()
        .throw_on_error(false)
        .with_stage(StageConfigBuilder::new("echo").arg("hi").build())
        .with_stage(StageConfigBuilder::new("cat").throw_on_error(true).build())
        .build();

    let tail = build_pipeline(&cfg)?;
    assert!(tail.throws_on_error());
    assert_eq!(tail.command(), None);
    Ok(())
}

#[tokio::test]
async fn execute_writes_chain_output_to_file() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.txt");
        let cfg = ConfigFileBuilder::new()
            .with_stage(StageConfigBuilder::new("echo").arg("hello").build())
            .with_stage(StageConfigBuilder::new("sed").arg("s/hello/hi/").build())
            .sink(SinkKind::Write, path.to_str())
            .build();

        let exit = execute(&cfg).await?;
        assert_eq!(exit, ExitValue::Code(0));
        assert_eq!(std::fs::read_to_string(&path)?, "hi\n");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn execute_routes_stderr_stage() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("errors.txt");
        let cfg = ConfigFileBuilder::new()
            .with_stage(
                StageConfigBuilder::new("sh")
                    .arg("-c")
                    .arg("echo oops >&2")
                    .build(),
            )
            .with_stage(
                StageConfigBuilder::new("tr")
                    .arg("a-z")
                    .arg("A-Z")
                    .stderr(true)
                    .build(),
            )
            .sink(SinkKind::Append, path.to_str())
            .build();

        execute(&cfg).await?;
        assert_eq!(std::fs::read_to_string(&path)?, "OOPS\n");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn stderr_stage_keeps_previous_stage_policy() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("errors.txt");
        let cfg = ConfigFileBuilder::new()
            .with_stage(
                StageConfigBuilder::new("sh")
                    .arg("-c")
                    .arg("echo oops >&2; exit 3")
                    .throw_on_error(false)
                    .build(),
            )
            .with_stage(
                StageConfigBuilder::new("tr")
                    .arg("a-z")
                    .arg("A-Z")
                    .stderr(true)
                    .build(),
            )
            .sink(SinkKind::Write, path.to_str())
            .build();

        let exit = execute(&cfg).await?;
        assert_eq!(exit, ExitValue::Code(0));
        assert_eq!(std::fs::read_to_string(&path)?, "OOPS\n");
        Ok(())
    })
    .await
}

#[tokio::test]
async fn execute_reports_suppressed_exit_code() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = ConfigFileBuilder::new()
            .throw_on_error(false)
            .with_stage(StageConfigBuilder::new("sh").arg("-c").arg("exit 3").build())
            .build();

        let exit = execute(&cfg).await?;
        assert_eq!(exit, ExitValue::Code(3));
        assert_eq!(exit_code(&exit), 3);
        Ok(())
    })
    .await
}

#[tokio::test]
async fn execute_fails_when_policy_throws() -> TestResult {
    with_timeout(async {
        init_tracing();

        let cfg = ConfigFileBuilder::new()
            .with_stage(StageConfigBuilder::new("sh").arg("-c").arg("exit 3").build())
            .sink(SinkKind::String, None)
            .build();

        let err = execute(&cfg).await.expect_err("should fail");
        assert!(format!("{err:#}").contains("code 3"), "unexpected error: {err:#}");
        Ok(())
    })
    .await
}

#[test]
fn signals_map_to_a_failing_exit_code() {
    assert_eq!(exit_code(&ExitValue::Code(0)), 0);
    assert_eq!(exit_code(&ExitValue::Signal("SIGTERM".to_string())), 1);
}

#[test]
fn describe_lists_stages_and_sink() {
    let cfg = ConfigFileBuilder::new()
        .with_stage(StageConfigBuilder::new("echo").arg("hello").build())
        .with_stage(StageConfigBuilder::new("wc").arg("-l").stderr(true).build())
        .sink(SinkKind::Write, Some("out.txt"))
        .build();

    let text = describe(&cfg);
    assert!(text.contains("stages (2)"));
    assert!(text.contains("1. echo \"hello\""));
    assert!(text.contains("input: stderr of previous stage"));
    assert!(text.contains("sink: Write -> out.txt"));
}

#[tokio::test]
async fn dry_run_validates_without_running() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let marker = dir.path().join("ran");
        let file = write_config(&format!(
            "[[stage]]\ncmd = \"touch\"\nargs = [{:?}]\n",
            marker.display().to_string()
        ));

        let args = CliArgs {
            config: file.path().to_path_buf(),
            log_level: None,
            dry_run: true,
        };
        let code = pipewright::run(args).await?;

        assert_eq!(code, 0);
        assert!(!marker.exists());
        Ok(())
    })
    .await
}

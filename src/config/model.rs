// src/config/model.rs

use serde::Deserialize;

/// Top-level pipeline file as read from TOML.
///
/// ```toml
/// [config]
/// throw_on_error = true
///
/// [[stage]]
/// cmd = "echo"
/// args = ["hello"]
///
/// [[stage]]
/// cmd = "sed"
/// args = ["s/hello/hi/"]
///
/// [sink]
/// kind = "append"
/// path = "hellos"
/// ```
///
/// This is the unvalidated form; convert it with `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Stages from `[[stage]]`, in pipeline order.
    #[serde(default)]
    pub stage: Vec<StageConfig>,

    /// Where the last stage's output goes.
    #[serde(default)]
    pub sink: SinkConfig,
}

/// A validated pipeline file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub stage: Vec<StageConfig>,
    pub sink: SinkConfig,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        stage: Vec<StageConfig>,
        sink: SinkConfig,
    ) -> Self {
        Self {
            config,
            stage,
            sink,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Whether non-zero exits and signals fail the run (default `true`).
    ///
    /// Applied to the first stage and inherited down the chain.
    #[serde(default = "default_throw_on_error")]
    pub throw_on_error: bool,
}

fn default_throw_on_error() -> bool {
    true
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            throw_on_error: default_throw_on_error(),
        }
    }
}

/// `[[stage]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    /// Program to run (looked up on `PATH`, no shell involved).
    pub cmd: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Feed this stage from the previous stage's error stream instead of its
    /// output stream.
    #[serde(default)]
    pub stderr: bool,

    /// Per-stage override of the inherited policy.
    #[serde(default)]
    pub throw_on_error: Option<bool>,
}

/// Kind of terminal sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Output goes straight to our own stdout.
    #[default]
    Inherit,
    /// Overwrite `path`.
    Write,
    /// Append to `path`.
    Append,
    /// Collect and print as one string.
    String,
    /// Collect line by line and print each line.
    Lines,
}

impl SinkKind {
    pub fn needs_path(self) -> bool {
        matches!(self, SinkKind::Write | SinkKind::Append)
    }
}

/// `[sink]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    #[serde(default)]
    pub path: Option<String>,
}

#![allow(dead_code)]

use pipewright::config::{
    ConfigFile, ConfigSection, RawConfigFile, SinkConfig, SinkKind, StageConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                stage: Vec::new(),
                sink: SinkConfig::default(),
            },
        }
    }

    pub fn with_stage(mut self, stage: StageConfig) -> Self {
        self.config.stage.push(stage);
        self
    }

    pub fn throw_on_error(mut self, val: bool) -> Self {
        self.config.config.throw_on_error = val;
        self
    }

    pub fn sink(mut self, kind: SinkKind, path: Option<&str>) -> Self {
        self.config.sink = SinkConfig {
            kind,
            path: path.map(|p| p.to_string()),
        };
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StageConfig`.
pub struct StageConfigBuilder {
    stage: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            stage: StageConfig {
                cmd: cmd.to_string(),
                args: vec![],
                stderr: false,
                throw_on_error: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.stage.args.push(arg.to_string());
        self
    }

    pub fn stderr(mut self, val: bool) -> Self {
        self.stage.stderr = val;
        self
    }

    pub fn throw_on_error(mut self, val: bool) -> Self {
        self.stage.throw_on_error = Some(val);
        self
    }

    pub fn build(self) -> StageConfig {
        self.stage
    }
}

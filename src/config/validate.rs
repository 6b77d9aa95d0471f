// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConfigError, ConfigResult};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConfigError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.stage, raw.sink))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> ConfigResult<()> {
    ensure_has_stages(cfg)?;
    validate_stages(cfg)?;
    validate_sink(cfg)?;
    Ok(())
}

fn ensure_has_stages(cfg: &RawConfigFile) -> ConfigResult<()> {
    if cfg.stage.is_empty() {
        return Err(ConfigError::Invalid(
            "pipeline must contain at least one [[stage]]".to_string(),
        ));
    }
    Ok(())
}

fn validate_stages(cfg: &RawConfigFile) -> ConfigResult<()> {
    for (idx, stage) in cfg.stage.iter().enumerate() {
        if stage.cmd.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "stage {} has an empty `cmd`",
                idx + 1
            )));
        }
        if idx == 0 && stage.stderr {
            return Err(ConfigError::Invalid(format!(
                "stage 1 ('{}') cannot read `stderr`: there is no previous stage",
                stage.cmd
            )));
        }
    }
    Ok(())
}

fn validate_sink(cfg: &RawConfigFile) -> ConfigResult<()> {
    let sink = &cfg.sink;
    match (sink.kind.needs_path(), sink.path.as_deref()) {
        (true, None) | (true, Some("")) => Err(ConfigError::Invalid(format!(
            "[sink] kind {:?} requires a `path`",
            sink.kind
        ))),
        (false, Some(path)) => Err(ConfigError::Invalid(format!(
            "[sink] kind {:?} does not take a `path` (got {path:?})",
            sink.kind
        ))),
        _ => Ok(()),
    }
}

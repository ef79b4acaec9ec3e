// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run validation.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks task names, glob selectors, parameter templates and the
///   dispatch backend settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let mut config = ConfigFile::try_from(raw_config)?;
    config.resolve_relative_paths(path.as_ref());
    Ok(config)
}

/// Default config path: `Runtrigger.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Runtrigger.toml")
}

impl ConfigFile {
    /// Interpret relative store/task-config directories against the directory
    /// of the config file rather than the process working directory.
    fn resolve_relative_paths(&mut self, config_path: &Path) {
        let base = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => return,
        };
        self.rebase_paths(&base);
    }
}

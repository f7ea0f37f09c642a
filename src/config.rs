// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::app::services::persistence::Format;

const APP_DIR_NAME: &str = "remote-task";
const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_ENV_VAR: &str = "REMOTE_TASK_CONFIG_PATH";
const CREDENTIALS_FILE_NAME: &str = "credentials.json";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    credentials_path: Option<String>,
    host_config_path: Option<String>,
    known_hosts_path: Option<String>,
    poll_interval_secs: Option<u64>,
    state_format: Option<Format>,
    verbose: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials_path: PathBuf,
    pub host_config_path: Option<PathBuf>,
    pub known_hosts_path: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub state_format: Format,
    pub verbose: bool,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Override,
    Env,
    ConfigFile,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Override => "override",
            ConfigSource::Env => "env",
            ConfigSource::ConfigFile => "config",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

#[derive(Debug)]
pub struct ConfigReport {
    pub config_path: Option<PathBuf>,
    pub config_path_source: Option<ConfigSource>,
    pub config_file_present: bool,
    pub credentials_path: ConfigValue<PathBuf>,
    pub host_config_path: ConfigValue<Option<PathBuf>>,
    pub poll_interval_secs: ConfigValue<u64>,
    pub state_format: ConfigValue<Format>,
    pub verbose: ConfigValue<bool>,
}

impl ConfigReport {
    /// Logs where each effective setting came from.
    pub fn log(&self) {
        match &self.config_path {
            Some(path) => tracing::debug!(
                "config file {} ({}, present: {})",
                path.display(),
                self.config_path_source.map_or("none", ConfigSource::as_str),
                self.config_file_present
            ),
            None => tracing::debug!("no config file location could be resolved"),
        }
        tracing::debug!(
            "credentials_path = {} ({})",
            self.credentials_path.value.display(),
            self.credentials_path.source.as_str()
        );
        tracing::debug!(
            "host_config_path = {} ({})",
            self.host_config_path
                .value
                .as_deref()
                .map_or_else(|| "<unset>".to_string(), |p| p.display().to_string()),
            self.host_config_path.source.as_str()
        );
        tracing::debug!(
            "poll_interval_secs = {} ({})",
            self.poll_interval_secs.value,
            self.poll_interval_secs.source.as_str()
        );
        tracing::debug!(
            "state_format = {} ({})",
            self.state_format.value,
            self.state_format.source.as_str()
        );
        tracing::debug!(
            "verbose = {} ({})",
            self.verbose.value,
            self.verbose.source.as_str()
        );
    }
}

#[derive(Debug)]
pub struct LoadResult {
    pub config: Config,
    pub report: ConfigReport,
}

#[derive(Debug, Default)]
pub struct Overrides {
    pub credentials_path: Option<PathBuf>,
    pub host_config_path: Option<PathBuf>,
    pub poll_interval_secs: Option<u64>,
    pub state_format: Option<Format>,
    pub verbose: Option<bool>,
}

pub fn load_with_report(
    config_path_override: Option<PathBuf>,
    overrides: Overrides,
) -> Result<LoadResult> {
    let (config_path, config_path_source, required) = match config_path_override {
        Some(path) => (Some(expand_path(path)), Some(ConfigSource::Override), true),
        None => match config_path_from_env()? {
            Some(path) => (Some(expand_path(path)), Some(ConfigSource::Env), true),
            None => match default_config_path().ok() {
                Some(path) => (Some(path), Some(ConfigSource::Default), false),
                None => (None, None, false),
            },
        },
    };
    let config_file_present = config_path.as_deref().is_some_and(Path::exists);

    let file_config = match config_path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => FileConfig::default(),
    };
    let base_dir = config_path.as_deref().and_then(Path::parent);

    let (credentials_path, credentials_source) = match overrides.credentials_path {
        Some(path) => (expand_path(path), ConfigSource::Override),
        None => match file_config.credentials_path {
            Some(raw) => (resolve_path(&raw, base_dir), ConfigSource::ConfigFile),
            None => (
                default_credentials_path().with_context(|| {
                    "failed to resolve default credentials path; pass --credentials or set credentials_path in the config file"
                })?,
                ConfigSource::Default,
            ),
        },
    };

    let (host_config_path, host_config_source) = match overrides.host_config_path {
        Some(path) => (Some(expand_path(path)), ConfigSource::Override),
        None => match file_config.host_config_path {
            Some(raw) => (Some(resolve_path(&raw, base_dir)), ConfigSource::ConfigFile),
            None => (None, ConfigSource::Default),
        },
    };

    let known_hosts_path = file_config
        .known_hosts_path
        .map(|raw| resolve_path(&raw, base_dir));

    let (poll_interval_secs, poll_interval_source) = match overrides.poll_interval_secs {
        Some(secs) => (secs, ConfigSource::Override),
        None => match file_config.poll_interval_secs {
            Some(secs) => (secs, ConfigSource::ConfigFile),
            None => (DEFAULT_POLL_INTERVAL_SECS, ConfigSource::Default),
        },
    };
    if poll_interval_secs == 0 {
        anyhow::bail!("poll_interval_secs must be at least 1");
    }

    let (state_format, state_format_source) = match overrides.state_format {
        Some(format) => (format, ConfigSource::Override),
        None => match file_config.state_format {
            Some(format) => (format, ConfigSource::ConfigFile),
            None => (Format::default(), ConfigSource::Default),
        },
    };

    let (verbose, verbose_source) = match overrides.verbose {
        Some(verbose) => (verbose, ConfigSource::Override),
        None => match file_config.verbose {
            Some(verbose) => (verbose, ConfigSource::ConfigFile),
            None => (false, ConfigSource::Default),
        },
    };

    let config = Config {
        credentials_path,
        host_config_path,
        known_hosts_path,
        poll_interval_secs,
        state_format,
        verbose,
        config_path: config_path.clone(),
    };

    let report = ConfigReport {
        config_path,
        config_path_source,
        config_file_present,
        credentials_path: ConfigValue {
            value: config.credentials_path.clone(),
            source: credentials_source,
        },
        host_config_path: ConfigValue {
            value: config.host_config_path.clone(),
            source: host_config_source,
        },
        poll_interval_secs: ConfigValue {
            value: config.poll_interval_secs,
            source: poll_interval_source,
        },
        state_format: ConfigValue {
            value: config.state_format,
            source: state_format_source,
        },
        verbose: ConfigValue {
            value: config.verbose,
            source: verbose_source,
        },
    };

    Ok(LoadResult { config, report })
}

/// Creates the parent directory of a file about to be written.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

fn read_config_file(path: &Path, required: bool) -> Result<FileConfig> {
    if !path.exists() {
        if required {
            anyhow::bail!("config file not found at {}", path.display());
        }
        return Ok(FileConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = shellexpand::tilde(raw);
    let path = PathBuf::from(expanded.as_ref());
    if path.is_absolute() {
        return path;
    }
    match base_dir {
        Some(dir) => dir.join(path),
        None => path,
    }
}

fn expand_path(path: PathBuf) -> PathBuf {
    let path_string = path.to_string_lossy().to_string();
    let expanded = shellexpand::tilde(&path_string);
    PathBuf::from(expanded.as_ref())
}

fn config_path_from_env() -> Result<Option<PathBuf>> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(value) => {
            if value.is_empty() {
                anyhow::bail!("{CONFIG_ENV_VAR} is set but empty");
            }
            Ok(Some(PathBuf::from(value)))
        }
        None => Ok(None),
    }
}

fn default_config_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join(CONFIG_FILE_NAME))
}

fn default_credentials_path() -> Result<PathBuf> {
    Ok(default_config_dir()?.join(CREDENTIALS_FILE_NAME))
}

fn default_config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("failed to resolve config directory")?;
    Ok(base.join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn load(config_path_override: Option<PathBuf>, overrides: Overrides) -> Result<Config> {
        Ok(load_with_report(config_path_override, overrides)?.config)
    }

    struct EnvVarGuard {
        key: &'static str,
        prev: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn clear(key: &'static str) -> Self {
            let prev = std::env::var_os(key);
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe {
                match &self.prev {
                    Some(value) => std::env::set_var(self.key, value),
                    None => std::env::remove_var(self.key),
                }
            }
        }
    }

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let config_dir = dir.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn missing_optional_config_file_is_ok() {
        let dir = TempDir::new().unwrap();
        let cfg = read_config_file(&dir.path().join("missing.toml"), false).unwrap();
        assert!(cfg.credentials_path.is_none());
        assert!(cfg.poll_interval_secs.is_none());
    }

    #[test]
    fn missing_required_config_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(&dir.path().join("missing.toml"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn relative_paths_resolve_from_config_dir() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "credentials_path = \"keys/creds.json\"\nhost_config_path = \"hosts/mn5.json\"\n",
        );
        let config_dir = path.parent().unwrap().to_path_buf();

        let config = load(Some(path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.credentials_path, config_dir.join("keys/creds.json"));
        assert_eq!(config.host_config_path, Some(config_dir.join("hosts/mn5.json")));
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(config.state_format, Format::Structured);
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn overrides_apply_per_field() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "credentials_path = \"creds.json\"\npoll_interval_secs = 9\nstate_format = \"binary\"\n",
        );

        let LoadResult { config, report } = load_with_report(
            Some(path),
            Overrides {
                poll_interval_secs: Some(2),
                verbose: Some(true),
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(config.poll_interval_secs, 2);
        assert_eq!(config.state_format, Format::Binary);
        assert!(config.verbose);
        assert_eq!(report.poll_interval_secs.source, ConfigSource::Override);
        assert_eq!(report.state_format.source, ConfigSource::ConfigFile);
        assert_eq!(report.host_config_path.source, ConfigSource::Default);
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "credentials_path = \"c.json\"\npoll_interval_secs = 0\n");
        let err = load(Some(path), Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("poll_interval_secs"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "credentials_path = \"c.json\"\ndatabase_path = \"x\"\n");
        assert!(load(Some(path), Overrides::default()).is_err());
    }

    #[test]
    fn ensure_parent_dir_creates_nested_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("nested").join("creds.json");
        ensure_parent_dir(&file).unwrap();
        assert!(dir.path().join("nested").is_dir());
        ensure_parent_dir(Path::new("creds.json")).unwrap();
    }

    #[test]
    fn env_config_path_used_when_no_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "credentials_path = \"c.json\"\npoll_interval_secs = 11\n");
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, path.to_str().unwrap());

        let LoadResult { config, report } = load_with_report(None, Overrides::default()).unwrap();
        assert_eq!(config.poll_interval_secs, 11);
        assert_eq!(config.config_path, Some(path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Env));
    }

    #[test]
    fn cli_config_path_takes_precedence_over_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::clear(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("env.toml");
        let cli_path = dir.path().join("cli.toml");
        fs::write(&env_path, "credentials_path = \"c.json\"\npoll_interval_secs = 5\n").unwrap();
        fs::write(&cli_path, "credentials_path = \"c.json\"\npoll_interval_secs = 6\n").unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, env_path.to_str().unwrap());

        let LoadResult { config, report } =
            load_with_report(Some(cli_path.clone()), Overrides::default()).unwrap();
        assert_eq!(config.poll_interval_secs, 6);
        assert_eq!(config.config_path, Some(cli_path));
        assert_eq!(report.config_path_source, Some(ConfigSource::Override));
    }

    #[test]
    fn empty_env_config_path_errors() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::set(CONFIG_ENV_VAR, "");
        let err = load(None, Overrides::default()).unwrap_err();
        assert!(err.to_string().contains("set but empty"));
    }
}

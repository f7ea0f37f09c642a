// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

//! Host-specific settings: which login hosts are allowed, named module sets
//! and queue presets, and node geometry.
//!
//! The raw document may be JSON or TOML. It is validated once at load time
//! so later lookups only fail for names the caller asked for.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::app::errors::{AppError, AppResult};
use crate::app::types::QueueSettings;

pub const DEFAULT_PRESET: &str = "default";
pub const DEBUG_PRESET: &str = "debug";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    description: String,
    login_hosts: Vec<String>,
    queues_command: Option<String>,
    cores_per_node: u32,
    gpus_per_node: u32,
    min_cores_per_gpu: u32,
    biobb_apps_path: Option<String>,
    modules: BTreeMap<String, Vec<String>>,
    presets: BTreeMap<String, QueueSettings>,
    default_preset: Option<String>,
    cmd_settings: BTreeMap<String, BTreeMap<String, String>>,
}

/// Abstract resource request, turned into scheduler directives by
/// [`HostConfig::settings_for`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    pub cores: Option<u32>,
    pub nodes: Option<u32>,
    pub gpus: Option<u32>,
    pub walltime: Option<String>,
    pub queue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHostConfig {
    #[serde(default)]
    description: String,
    #[serde(default)]
    login_hosts: Vec<String>,
    #[serde(default)]
    queues_command: Option<String>,
    cores_per_node: u32,
    #[serde(default)]
    gpus_per_node: u32,
    #[serde(default)]
    min_cores_per_gpu: u32,
    #[serde(default)]
    biobb_apps_path: Option<String>,
    #[serde(default)]
    modules: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    qsettings: IndexMap<String, RawPreset>,
    #[serde(default)]
    cmd_settings: BTreeMap<String, IndexMap<String, DirectiveValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPreset {
    Alias(String),
    Settings(IndexMap<String, DirectiveValue>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectiveValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl DirectiveValue {
    fn normalize(self) -> String {
        match self {
            DirectiveValue::Text(text) => text,
            DirectiveValue::Integer(value) => value.to_string(),
            DirectiveValue::Flag(value) => value.to_string(),
        }
    }
}

fn normalize_map(raw: IndexMap<String, DirectiveValue>) -> impl Iterator<Item = (String, String)> {
    raw.into_iter().map(|(key, value)| (key, value.normalize()))
}

impl HostConfig {
    /// Loads a host configuration; `.toml` files are read as TOML and
    /// anything else as JSON.
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            AppError::configuration(format!(
                "failed to read host configuration {}: {err}",
                path.display()
            ))
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            Self::from_toml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        };
        parsed.map_err(|err| err.with_context(path.display().to_string()))
    }

    pub fn from_json_str(raw: &str) -> AppResult<Self> {
        let raw: RawHostConfig = serde_json::from_str(raw).map_err(|err| {
            AppError::configuration(format!("invalid host configuration: {err}"))
        })?;
        Self::validate(raw)
    }

    pub fn from_toml_str(raw: &str) -> AppResult<Self> {
        let raw: RawHostConfig = toml::from_str(raw).map_err(|err| {
            AppError::configuration(format!("invalid host configuration: {err}"))
        })?;
        Self::validate(raw)
    }

    fn validate(raw: RawHostConfig) -> AppResult<Self> {
        if raw.login_hosts.is_empty() {
            return Err(AppError::configuration(
                "host configuration lists no login_hosts",
            ));
        }
        if raw.cores_per_node == 0 {
            return Err(AppError::configuration("cores_per_node must be positive"));
        }
        if let Some((name, _)) = raw.modules.iter().find(|(_, mods)| mods.is_empty()) {
            return Err(AppError::configuration(format!(
                "module set '{name}' is empty"
            )));
        }

        let mut presets = BTreeMap::new();
        let mut aliases = Vec::new();
        for (name, preset) in raw.qsettings {
            match preset {
                RawPreset::Settings(values) => {
                    presets.insert(name, normalize_map(values).collect::<QueueSettings>());
                }
                RawPreset::Alias(target) => aliases.push((name, target)),
            }
        }
        let mut default_preset = None;
        for (name, target) in aliases {
            if !presets.contains_key(&target) {
                return Err(AppError::configuration(format!(
                    "queue preset alias '{name}' points to unknown preset '{target}'"
                )));
            }
            if name == DEFAULT_PRESET {
                default_preset = Some(target);
            } else {
                let settings = presets[&target].clone();
                presets.insert(name, settings);
            }
        }

        let cmd_settings = raw
            .cmd_settings
            .into_iter()
            .map(|(name, values)| (name, normalize_map(values).collect()))
            .collect();

        Ok(Self {
            description: raw.description,
            login_hosts: raw.login_hosts,
            queues_command: raw.queues_command,
            cores_per_node: raw.cores_per_node,
            gpus_per_node: raw.gpus_per_node,
            min_cores_per_gpu: raw.min_cores_per_gpu,
            biobb_apps_path: raw.biobb_apps_path,
            modules: raw.modules,
            presets,
            default_preset,
            cmd_settings,
        })
    }

    pub fn is_login_host(&self, host: &str) -> bool {
        self.login_hosts.iter().any(|allowed| allowed == host)
    }

    pub fn ensure_login_host(&self, host: &str) -> AppResult<()> {
        if self.is_login_host(host) {
            return Ok(());
        }
        Err(AppError::configuration(format!(
            "host '{host}' is not an allowed login host (allowed: {})",
            self.login_hosts.join(", ")
        )))
    }

    pub fn module_set(&self, name: &str) -> AppResult<&[String]> {
        self.modules
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| AppError::configuration(format!("unknown module set '{name}'")))
    }

    /// Settings of the named preset; `None` or `"default"` selects the
    /// host's default preset.
    pub fn preset(&self, name: Option<&str>) -> AppResult<&QueueSettings> {
        let name = match name {
            Some(name) if name != DEFAULT_PRESET => name,
            _ => self.default_preset.as_deref().ok_or_else(|| {
                AppError::configuration("host configuration defines no default queue preset")
            })?,
        };
        self.presets
            .get(name)
            .ok_or_else(|| AppError::configuration(format!("unknown queue preset '{name}'")))
    }

    pub fn debug_overlay(&self) -> Option<&QueueSettings> {
        self.presets.get(DEBUG_PRESET)
    }

    /// Translates an abstract resource request into directive settings.
    pub fn settings_for(&self, request: &ResourceRequest) -> AppResult<QueueSettings> {
        let gpus = request.gpus.unwrap_or(0);
        let mut cores = request.cores.unwrap_or(1).max(1);
        if gpus > 0 {
            if self.gpus_per_node == 0 {
                return Err(AppError::configuration(
                    "GPUs requested but the host has none",
                ));
            }
            cores = cores.max(gpus.saturating_mul(self.min_cores_per_gpu));
        }
        let nodes = match request.nodes {
            Some(nodes) if nodes > 0 => nodes,
            _ => cores.div_ceil(self.cores_per_node),
        };
        if gpus > self.gpus_per_node.saturating_mul(nodes) {
            return Err(AppError::configuration(format!(
                "{gpus} GPUs requested but {nodes} node(s) provide only {}",
                self.gpus_per_node.saturating_mul(nodes)
            )));
        }

        let mut settings = QueueSettings::new();
        settings.set("nodes", nodes.to_string());
        if nodes == 1 {
            settings.set("cpus-per-task", cores.to_string());
        } else {
            settings.set("ntasks", cores.to_string());
        }
        if gpus > 0 {
            settings.set("gpus", gpus.to_string());
        }
        if let Some(walltime) = &request.walltime {
            settings.set("time", walltime.clone());
        }
        if let Some(queue) = &request.queue {
            settings.set("partition", queue.clone());
        }
        Ok(settings)
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn login_hosts(&self) -> &[String] {
        &self.login_hosts
    }

    pub fn queues_command(&self) -> Option<&str> {
        self.queues_command.as_deref()
    }

    pub fn cores_per_node(&self) -> u32 {
        self.cores_per_node
    }

    pub fn gpus_per_node(&self) -> u32 {
        self.gpus_per_node
    }

    pub fn biobb_apps_path(&self) -> Option<&str> {
        self.biobb_apps_path.as_deref()
    }

    /// Per-tool command-line flag aliases, keyed by tool name.
    pub fn cmd_settings(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.cmd_settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::errors::AppErrorKind;

    const SAMPLE: &str = r#"{
        "description": "Test cluster",
        "login_hosts": ["login1.example.org", "login2.example.org"],
        "queues_command": "bsc_queues",
        "cores_per_node": 48,
        "gpus_per_node": 4,
        "min_cores_per_gpu": 10,
        "modules": {"biobb": ["anaconda", "gromacs/2021"]},
        "qsettings": {
            "default": "serial",
            "serial": {"ntasks": 1, "time": "00:10:00"},
            "openMP_full_node": {"cpus-per-task": 40, "nodes": 1},
            "debug": {"qos": "debug"},
            "exclusive_node": {"exclusive": true}
        },
        "cmd_settings": {"gromacs": {"gmx": "gmx_mpi"}}
    }"#;

    #[test]
    fn presets_normalize_values_and_keep_order() {
        let config = HostConfig::from_json_str(SAMPLE).unwrap();
        let preset = config.preset(Some("openMP_full_node")).unwrap();
        let pairs: Vec<(&str, &str)> = preset.iter().collect();
        assert_eq!(pairs, vec![("cpus-per-task", "40"), ("nodes", "1")]);
        assert_eq!(
            config.preset(Some("exclusive_node")).unwrap().get("exclusive"),
            Some("true")
        );
        assert_eq!(config.cmd_settings()["gromacs"]["gmx"], "gmx_mpi");
    }

    #[test]
    fn default_alias_resolves_to_named_preset() {
        let config = HostConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(config.preset(None).unwrap().get("ntasks"), Some("1"));
        assert_eq!(config.preset(Some("default")).unwrap().get("ntasks"), Some("1"));
        assert_eq!(config.debug_overlay().unwrap().get("qos"), Some("debug"));
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let config = HostConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(
            config.preset(Some("gpu_huge")).unwrap_err().kind(),
            AppErrorKind::Configuration
        );
        assert_eq!(
            config.module_set("amber").unwrap_err().kind(),
            AppErrorKind::Configuration
        );
        assert!(config.ensure_login_host("login1.example.org").is_ok());
        assert_eq!(
            config.ensure_login_host("elsewhere").unwrap_err().kind(),
            AppErrorKind::Configuration
        );
    }

    #[test]
    fn validation_rejects_dangling_default_and_missing_hosts() {
        let dangling = r#"{"login_hosts": ["h"], "cores_per_node": 4, "qsettings": {"default": "nope"}}"#;
        assert!(HostConfig::from_json_str(dangling).is_err());
        let no_hosts = r#"{"login_hosts": [], "cores_per_node": 4}"#;
        assert!(HostConfig::from_json_str(no_hosts).is_err());
        let no_cores = r#"{"login_hosts": ["h"], "cores_per_node": 0}"#;
        assert!(HostConfig::from_json_str(no_cores).is_err());
    }

    #[test]
    fn toml_documents_are_accepted() {
        let raw = r#"
login_hosts = ["login1"]
cores_per_node = 16

[modules]
biobb = ["anaconda"]

[qsettings]
default = "small"

[qsettings.small]
ntasks = 2
partition = "main"
"#;
        let config = HostConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.preset(None).unwrap().get("ntasks"), Some("2"));
        assert_eq!(config.module_set("biobb").unwrap(), ["anaconda".to_string()]);
    }

    #[test]
    fn resource_requests_map_to_directives() {
        let config = HostConfig::from_json_str(SAMPLE).unwrap();
        let settings = config
            .settings_for(&ResourceRequest {
                cores: Some(96),
                walltime: Some("02:00:00".into()),
                queue: Some("main".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.get("nodes"), Some("2"));
        assert_eq!(settings.get("ntasks"), Some("96"));
        assert_eq!(settings.get("time"), Some("02:00:00"));
        assert_eq!(settings.get("partition"), Some("main"));

        let gpu = config
            .settings_for(&ResourceRequest {
                cores: Some(4),
                gpus: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(gpu.get("cpus-per-task"), Some("20"));
        assert_eq!(gpu.get("gpus"), Some("2"));

        let too_many = config.settings_for(&ResourceRequest {
            gpus: Some(5),
            nodes: Some(1),
            ..Default::default()
        });
        assert!(too_many.is_err());
    }
}

// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::fs;
use std::path::PathBuf;

use crate::app::errors::{AppError, AppResult};

pub const SHEBANG: &str = "#!/bin/bash";

/// Marker that identifies a string as script text rather than a path.
pub const SCRIPT_MARKER: &str = "#script";

/// Where the payload of a queue script comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptSource {
    File(PathBuf),
    Inline(String),
}

impl ScriptSource {
    /// Treats `value` as inline text when it carries the script marker or
    /// spans several lines, and as a local path otherwise.
    pub fn detect(value: &str) -> Self {
        if value.contains(SCRIPT_MARKER) || value.contains('\n') {
            ScriptSource::Inline(value.to_string())
        } else {
            ScriptSource::File(PathBuf::from(value))
        }
    }

    pub fn load(&self) -> AppResult<String> {
        match self {
            ScriptSource::Inline(text) => Ok(text.clone()),
            ScriptSource::File(path) => fs::read_to_string(path).map_err(|err| {
                AppError::local_io(format!("failed to read script {}: {err}", path.display()))
            }),
        }
    }
}

/// Assembles the final script: shebang, directives, module loads, optional
/// environment activation, then the payload without its own shebang.
pub fn render_script(
    directives: &[String],
    modules: &[String],
    environment: Option<&str>,
    payload: &str,
) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(directives.len() + modules.len() + 4);
    lines.push(SHEBANG.to_string());
    lines.extend(directives.iter().cloned());
    lines.extend(modules.iter().map(|module| format!("module load {module}")));
    if let Some(env) = environment {
        lines.push(format!("conda activate {}", sh_escape(env)));
    }
    let mut payload_lines = payload.lines().peekable();
    if payload_lines.peek().is_some_and(|first| first.starts_with("#!")) {
        payload_lines.next();
    }
    lines.extend(payload_lines.map(str::to_string));
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Single-quotes a string for the remote shell.
pub fn sh_escape(p: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&p.replace('\'', r"'\''"));
    out.push('\'');
    out
}

pub fn join_remote(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/'))
}

use crate::pipeline::OutputMode;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default handling of child output
const DEFAULT_OUTPUT_MODE: OutputMode = OutputMode::Inherit;

/// Default glob used to discover a step file
const DEFAULT_CONFIG_PATTERN: &str = "steps*.yaml";

/// Application settings that can be configured via YAML, environment variables, or CLI flags
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
pub struct Settings {
    /// How child stdout/stderr is handled
    #[arg(
        long = "output",
        env = "STEPRUNNER_OUTPUT",
        value_enum,
        default_value_t = DEFAULT_OUTPUT_MODE,
        help = "How step output is handled: inherit, capture or stream"
    )]
    pub output: OutputMode,

    /// Shell used for `shell` steps
    #[arg(
        long = "shell",
        env = "STEPRUNNER_SHELL",
        help = "Shell used to run `shell` steps (default: sh, or cmd on Windows)"
    )]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Glob pattern for discovering the step file when none is given.
    /// CLI/env only: discovery runs before any YAML is read.
    #[arg(
        long = "config-pattern",
        env = "STEPRUNNER_CONFIG_PATTERN",
        default_value = DEFAULT_CONFIG_PATTERN,
        help = "Glob pattern for finding a step file in the current directory"
    )]
    #[serde(skip, default = "default_config_pattern")]
    pub config_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: DEFAULT_OUTPUT_MODE,
            shell: None,
            config_pattern: DEFAULT_CONFIG_PATTERN.to_string(),
        }
    }
}

fn default_config_pattern() -> String {
    DEFAULT_CONFIG_PATTERN.to_string()
}

impl Settings {
    /// Merge settings from different sources with proper priority
    /// CLI/env settings override YAML settings
    pub fn merge_with_yaml(&mut self, yaml_settings: &Settings) {
        // A CLI value equal to the default is indistinguishable from "not given"
        if self.output == DEFAULT_OUTPUT_MODE && yaml_settings.output != DEFAULT_OUTPUT_MODE {
            self.output = yaml_settings.output;
        }

        if self.shell.is_none() {
            self.shell = yaml_settings.shell.clone();
        }
    }

    /// Shell program and the flag that makes it run a script argument.
    pub fn shell_invocation(&self) -> (&str, &'static str) {
        match &self.shell {
            Some(shell) => (shell.as_str(), script_flag(shell)),
            None if cfg!(windows) => ("cmd", "/C"),
            None => ("sh", "-c"),
        }
    }
}

fn script_flag(shell: &str) -> &'static str {
    let stem = Path::new(shell)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match stem.as_str() {
        "cmd" => "/C",
        "powershell" | "pwsh" => "-Command",
        _ => "-c",
    }
}

use crate::error::ConfigError;
use crate::pipeline::Step;
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StepConfig {
    Command {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    Shell {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        script: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
}

impl StepConfig {
    pub fn name(&self) -> Option<&str> {
        match self {
            StepConfig::Command { name, .. } | StepConfig::Shell { name, .. } => name.as_deref(),
        }
    }

    pub fn cwd(&self) -> Option<&Path> {
        match self {
            StepConfig::Command { cwd, .. } | StepConfig::Shell { cwd, .. } => cwd.as_deref(),
        }
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        match self {
            StepConfig::Command { env, .. } | StepConfig::Shell { env, .. } => env,
        }
    }

    /// Build the runnable step. Relative `cwd` values resolve against `base_dir`,
    /// and steps without one run in `base_dir` unless it is empty.
    pub fn to_step(&self, settings: &Settings, base_dir: &Path) -> Step {
        let step = match self {
            StepConfig::Command { program, args, .. } => Step::new(program.as_str()).args(args),
            StepConfig::Shell { script, .. } => {
                let (shell, flag) = settings.shell_invocation();
                Step::new(shell).arg(flag).arg(script.as_str())
            }
        };

        let step = match self.name() {
            Some(name) => step.named(name),
            None => step,
        };

        let cwd = match self.cwd() {
            Some(dir) => Some(base_dir.join(dir)),
            None if base_dir.as_os_str().is_empty() => None,
            None => Some(base_dir.to_path_buf()),
        };
        let step = match cwd {
            Some(dir) => step.cwd(dir),
            None => step,
        };

        step.envs(self.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    pub fn into_steps(&self, settings: &Settings, base_dir: &Path) -> Vec<Step> {
        self.steps
            .iter()
            .map(|step| step.to_step(settings, base_dir))
            .collect()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_yaml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::OutputMode;

    const PLUGIN_BUILD: &str = r#"
settings:
  output: capture
steps:
  - type: command
    name: build
    program: cargo
    args: [build, --release]
    env:
      CARGO_TERM_COLOR: always
  - type: shell
    name: install
    cwd: target/release
    script: cp libplugin.so ../../plugins/
"#;

    fn sh_settings() -> Settings {
        Settings {
            shell: Some("sh".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_parse_command_and_shell_steps() {
        let config: Config = PLUGIN_BUILD.parse().unwrap();

        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.settings.as_ref().map(|s| s.output), Some(OutputMode::Capture));
        match &config.steps[0] {
            StepConfig::Command { program, args, env, .. } => {
                assert_eq!(program, "cargo");
                assert_eq!(args, &["build", "--release"]);
                assert_eq!(env.get("CARGO_TERM_COLOR").map(String::as_str), Some("always"));
            }
            other => panic!("expected command step, got {:?}", other),
        }
        assert_eq!(config.steps[1].name(), Some("install"));
    }

    #[test]
    fn test_into_steps_without_base_dir() {
        let config: Config = PLUGIN_BUILD.parse().unwrap();
        let steps = config.into_steps(&sh_settings(), Path::new(""));

        assert_eq!(steps[0].command_line(), "cargo build --release");
        assert_eq!(steps[0].working_dir(), None);
        assert_eq!(steps[1].program(), "sh");
        assert_eq!(steps[1].arguments(), ["-c", "cp libplugin.so ../../plugins/"]);
        assert_eq!(steps[1].working_dir(), Some(Path::new("target/release")));
    }

    #[test]
    fn test_into_steps_resolves_against_base_dir() {
        let config: Config = PLUGIN_BUILD.parse().unwrap();
        let steps = config.into_steps(&sh_settings(), Path::new("/work/plugin"));

        assert_eq!(steps[0].working_dir(), Some(Path::new("/work/plugin")));
        assert_eq!(
            steps[1].working_dir(),
            Some(Path::new("/work/plugin/target/release"))
        );
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let err = "steps:\n  - type: docker\n    image: x\n"
            .parse::<Config>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Config::from_file("/nonexistent/steps.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/steps.yaml"));
    }

    #[test]
    fn test_empty_document_has_no_steps() {
        let config: Config = "steps: []".parse().unwrap();
        assert!(config.steps.is_empty());
        assert!(config.settings.is_none());
    }
}

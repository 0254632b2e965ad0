use crate::config::{Config, StepConfig};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Check a step file before anything runs.
///
/// `base_dir` is where relative working directories resolve, matching
/// [`Config::into_steps`].
pub fn validate_config(config: &Config, base_dir: &Path) -> ValidationResult {
    let mut result = ValidationResult::new();

    if config.steps.is_empty() {
        result.add_error("No steps defined".to_string());
        return result;
    }

    let mut seen_names: HashMap<&str, usize> = HashMap::new();

    for (idx, step) in config.steps.iter().enumerate() {
        let label = match step.name() {
            Some(name) => format!("Step {} ({})", idx + 1, name),
            None => format!("Step {}", idx + 1),
        };
        debug!("Validating {}", label);

        match step {
            StepConfig::Command { program, .. } if program.trim().is_empty() => {
                result.add_error(format!("{}: program is empty", label));
            }
            StepConfig::Shell { script, .. } if script.trim().is_empty() => {
                result.add_error(format!("{}: script is empty", label));
            }
            _ => {}
        }

        match step.name() {
            Some(name) => {
                if let Some(first) = seen_names.insert(name, idx) {
                    result.add_error(format!(
                        "{}: name '{}' is already used by step {}",
                        label,
                        name,
                        first + 1
                    ));
                }
            }
            None => result.add_warning(format!("{}: has no name", label)),
        }

        for key in step.env().keys() {
            if key.is_empty() {
                result.add_error(format!("{}: environment variable name is empty", label));
            } else if key.contains('=') || key.contains('\0') {
                result.add_error(format!("{}: invalid environment variable name '{}'", label, key));
            }
        }

        if let Some(cwd) = step.cwd() {
            let resolved = base_dir.join(cwd);
            if !resolved.is_dir() {
                result.add_warning(format!(
                    "{}: working directory {} does not exist yet",
                    label,
                    resolved.display()
                ));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn command(name: Option<&str>, program: &str) -> StepConfig {
        StepConfig::Command {
            name: name.map(str::to_string),
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    fn config(steps: Vec<StepConfig>) -> Config {
        Config {
            settings: None,
            steps,
        }
    }

    #[test]
    fn test_validate_success() {
        let config = config(vec![command(Some("build"), "cargo"), command(Some("copy"), "cp")]);
        let result = validate_config(&config, Path::new(""));

        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_validate_no_steps() {
        let result = validate_config(&config(Vec::new()), Path::new(""));
        assert!(!result.is_valid);
        assert_eq!(result.errors, ["No steps defined"]);
    }

    #[test]
    fn test_validate_empty_program_and_script() {
        let shell = StepConfig::Shell {
            name: Some("install".to_string()),
            script: "  ".to_string(),
            cwd: None,
            env: BTreeMap::new(),
        };
        let result = validate_config(&config(vec![command(Some("build"), ""), shell]), Path::new(""));

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("program is empty"));
        assert!(result.errors[1].contains("script is empty"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let config = config(vec![command(Some("build"), "cargo"), command(Some("build"), "make")]);
        let result = validate_config(&config, Path::new(""));

        assert!(!result.is_valid);
        assert!(result.errors[0].contains("already used by step 1"));
    }

    #[test]
    fn test_validate_bad_env_key() {
        let mut env = BTreeMap::new();
        env.insert("A=B".to_string(), "1".to_string());
        let step = StepConfig::Command {
            name: Some("build".to_string()),
            program: "cargo".to_string(),
            args: Vec::new(),
            cwd: None,
            env,
        };
        let result = validate_config(&config(vec![step]), Path::new(""));

        assert!(!result.is_valid);
        assert!(result.errors[0].contains("'A=B'"));
    }

    #[test]
    fn test_validate_missing_cwd_is_warning() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("present")).unwrap();

        let step = |name: &str, cwd: &str| StepConfig::Command {
            name: Some(name.to_string()),
            program: "cargo".to_string(),
            args: Vec::new(),
            cwd: Some(cwd.into()),
            env: BTreeMap::new(),
        };
        let config = config(vec![step("a", "present"), step("b", "target/release")]);
        let result = validate_config(&config, dir.path());

        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("target/release"));
    }

    #[test]
    fn test_validate_unnamed_step_is_warning() {
        let result = validate_config(&config(vec![command(None, "cargo")]), Path::new(""));
        assert!(result.is_valid);
        assert_eq!(result.warnings, ["Step 1: has no name"]);
    }
}

use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Select};
use glob::glob;
use std::path::{Path, PathBuf};

/// Scan a directory for step files matching the given pattern
pub fn find_configs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = dir.join(pattern);
    let pattern_str = full_pattern.to_string_lossy();

    tracing::debug!("Scanning for step files with pattern: {}", pattern_str);

    let mut found = Vec::new();
    for entry in glob(&pattern_str)? {
        match entry {
            Ok(path) if path.is_file() => found.push(path),
            Ok(_) => {}
            Err(e) => tracing::warn!("Error reading glob entry: {}", e),
        }
    }
    found.sort();

    tracing::debug!("Found {} step files matching '{}'", found.len(), pattern);
    Ok(found)
}

/// Pick the step file to run: the only match, or the user's choice among several.
pub fn choose_config(dir: &Path, pattern: &str) -> Result<PathBuf> {
    let mut found = find_configs(dir, pattern)?;

    match found.len() {
        0 => anyhow::bail!(
            "No step file given and none matching '{}' in {}",
            pattern,
            dir.display()
        ),
        1 => Ok(found.remove(0)),
        _ => {
            let names: Vec<String> = found
                .iter()
                .map(|p| {
                    p.strip_prefix(dir)
                        .unwrap_or(p)
                        .display()
                        .to_string()
                })
                .collect();

            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select step file")
                .items(&names)
                .default(0)
                .interact()?;

            Ok(found.swap_remove(selection))
        }
    }
}

// Env file persistence
// Rewrites a single KEY=value line in a dotenv file, leaving the rest untouched

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Set `key` to `value` in the env file at `path`.
///
/// Returns `Ok(false)` when the file does not exist; the file is never created.
/// An existing assignment (optionally prefixed with `export`) is replaced in
/// place, otherwise the assignment is appended.
pub fn update_env_key(path: &Path, key: &str, value: &str) -> Result<bool> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Env file not found, token not persisted");
        return Ok(false);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file: {}", path.display()))?;

    let assignment = format!("{key}='{value}'");
    let mut replaced = false;
    let mut lines: Vec<String> = contents
        .lines()
        .map(|line| {
            if !replaced && assigns_key(line, key) {
                replaced = true;
                assignment.clone()
            } else {
                line.to_string()
            }
        })
        .collect();

    if !replaced {
        lines.push(assignment);
    }

    let mut output = lines.join("\n");
    output.push('\n');

    fs::write(path, output)
        .with_context(|| format!("Failed to write env file: {}", path.display()))?;

    tracing::info!(path = %path.display(), key = key, "Updated env file");
    Ok(true)
}

fn assigns_key(line: &str, key: &str) -> bool {
    let line = line.trim_start();
    let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
    line.strip_prefix(key)
        .map(|rest| rest.trim_start().starts_with('='))
        .unwrap_or(false)
}

// Command-backed token provider
//
// Runs an external login helper (e.g. a headless-browser script that signs in
// and reads the token from localStorage) and takes the token from its stdout.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::TokenProvider;

pub struct CommandTokenProvider {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTokenProvider {
    /// Build from a command line split into program and arguments
    pub fn new(command: &[String], timeout: Duration) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Token refresh command is empty")?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl TokenProvider for CommandTokenProvider {
    async fn obtain_fresh_token(&self) -> Result<String> {
        tracing::info!(program = %self.program, "Fetching fresh authentication token");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start token refresh command '{}'", self.program))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Token refresh command timed out after {}s",
                    self.timeout.as_secs()
                )
            })?
            .context("Failed to wait for token refresh command")?;

        if !output.status.success() {
            bail!("Token refresh command exited with {}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_token_output(&stdout) {
            Some(token) => {
                tracing::info!("Token retrieved successfully");
                Ok(token)
            }
            None => bail!("Token refresh command printed no token"),
        }
    }
}

/// Token from helper output: the last non-empty line, surrounding quotes
/// stripped. `null` means the helper found nothing.
pub fn parse_token_output(stdout: &str) -> Option<String> {
    let line = stdout.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let token = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(line)
        .trim();

    if token.is_empty() || token == "null" {
        None
    } else {
        Some(token.to_string())
    }
}

//! Runner for the `specify` tool from GitHub Spec-Kit.
//!
//! Two front ends share this runner: a browser-facing HTTP service
//! ([`web`]) and a line-delimited JSON adapter on stdio ([`stdio`]). Both
//! restrict callers to a closed set of subcommands and reject arguments
//! carrying shell metacharacters.

pub mod stdio;
pub mod web;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::executor::{run_shell, ExecError};

/// Characters that may not appear in a `specify` argument.
pub const FORBIDDEN_ARG_CHARS: &[char] = &['|', '&', ';', '$', '`', '\n', '\r'];

/// Subcommands of `specify` callers may reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifySubcommand {
    Init,
    Check,
    Version,
    Help,
}

impl SpecifySubcommand {
    pub const ALL: [SpecifySubcommand; 4] = [
        SpecifySubcommand::Check,
        SpecifySubcommand::Version,
        SpecifySubcommand::Init,
        SpecifySubcommand::Help,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecifySubcommand::Init => "init",
            SpecifySubcommand::Check => "check",
            SpecifySubcommand::Version => "version",
            SpecifySubcommand::Help => "help",
        }
    }

    /// `['check', 'version', 'init', 'help']`
    pub fn valid_list() -> String {
        let names: Vec<String> = Self::ALL
            .iter()
            .map(|s| format!("'{}'", s.as_str()))
            .collect();
        format!("[{}]", names.join(", "))
    }
}

impl fmt::Display for SpecifySubcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSubcommand(pub String);

impl fmt::Display for UnknownSubcommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Unknown command: {}. Valid: {}",
            self.0,
            SpecifySubcommand::valid_list()
        )
    }
}

impl std::error::Error for UnknownSubcommand {}

impl FromStr for SpecifySubcommand {
    type Err = UnknownSubcommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SpecifySubcommand::ALL
            .into_iter()
            .find(|sub| sub.as_str() == s)
            .ok_or_else(|| UnknownSubcommand(s.to_string()))
    }
}

/// Returns the first argument containing a forbidden character.
pub fn find_invalid_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .find(|arg| arg.contains(FORBIDDEN_ARG_CHARS))
        .map(String::as_str)
}

/// Result of one `specify` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecifyOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i32,
}

impl SpecifyOutcome {
    pub fn failure(stderr: impl Into<String>, returncode: i32) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            returncode,
        }
    }
}

/// Invokes `specify` through a shell launcher prefix.
#[derive(Debug, Clone)]
pub struct SpecifyRunner {
    shell: String,
    launcher: String,
    timeout: Duration,
}

impl SpecifyRunner {
    pub fn new(shell: impl Into<String>, launcher: impl Into<String>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            launcher: launcher.into(),
            timeout,
        }
    }

    fn script(&self, sub: SpecifySubcommand, args: &[String]) -> String {
        let mut script = format!("{} {}", self.launcher, sub);
        if !args.is_empty() {
            script.push(' ');
            script.push_str(&args.join(" "));
        }
        script
    }

    /// Run `sub` with `args`. Arguments must already be validated.
    pub async fn run(&self, sub: SpecifySubcommand, args: &[String]) -> SpecifyOutcome {
        let script = self.script(sub, args);
        tracing::info!(subcommand = %sub, "Running specify");

        match run_shell(&self.shell, &script, self.timeout).await {
            Ok(result) => SpecifyOutcome {
                success: result.returncode == 0,
                stdout: result.stdout,
                stderr: result.stderr,
                returncode: result.returncode,
            },
            Err(ExecError::Timeout(limit)) => {
                tracing::warn!(subcommand = %sub, "specify timed out");
                SpecifyOutcome::failure(
                    format!("Command timed out after {} seconds", limit.as_secs()),
                    -1,
                )
            }
            Err(e) => {
                tracing::error!(subcommand = %sub, error = %e, "specify failed to start");
                SpecifyOutcome::failure(e.to_string(), -1)
            }
        }
    }
}

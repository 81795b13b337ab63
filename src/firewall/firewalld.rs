//! firewalld backend
//!
//! Uses `firewall-cmd` without `--permanent`, so rules only live until the
//! daemon is reloaded.

use std::process::{Command, Stdio};

use super::{FirewallBackend, FirewallError, FirewallResult, FirewallRule, RuleAction};

/// Default name of the firewalld CLI
pub const DEFAULT_BINARY: &str = "firewall-cmd";

/// Backend driving firewalld through its command-line client.
#[derive(Debug, Clone)]
pub struct Firewalld {
    binary: String,
}

impl Firewalld {
    /// Use `firewall-cmd` from PATH.
    pub fn new() -> Self {
        Self::with_binary(DEFAULT_BINARY)
    }

    /// Use a specific firewall-cmd compatible executable.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Arguments passed to the tool for `action` on `rule`.
    pub fn args(action: RuleAction, rule: &FirewallRule) -> Vec<String> {
        let flag = match action {
            RuleAction::Add => "--add-port",
            RuleAction::Remove => "--remove-port",
        };
        vec![
            format!("--zone={}", rule.zone()),
            format!("{}={}/{}", flag, rule.port(), rule.protocol()),
        ]
    }

    fn run(&self, action: RuleAction, rule: &FirewallRule) -> FirewallResult<()> {
        let args = Self::args(action, rule);
        tracing::debug!(binary = %self.binary, ?args, "Running firewall command");

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| FirewallError::SpawnFailed {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(FirewallError::CommandFailed {
                action,
                port: rule.port(),
                zone: rule.zone().to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}

impl Default for Firewalld {
    fn default() -> Self {
        Self::new()
    }
}

impl FirewallBackend for Firewalld {
    fn name(&self) -> &'static str {
        "firewalld"
    }

    fn open(&self, rule: &FirewallRule) -> FirewallResult<()> {
        self.run(RuleAction::Add, rule)
    }

    fn close(&self, rule: &FirewallRule) -> FirewallResult<()> {
        self.run(RuleAction::Remove, rule)
    }
}

//! Firewall integration
//!
//! Opens and closes a single TCP port rule through an external firewall
//! tool. The controller never inspects current firewall state: opening twice
//! or closing a rule that does not exist is left to the tool's own behavior.

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;

mod firewalld;
pub mod mock;

pub use firewalld::Firewalld;

/// Error types for firewall operations
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Invalid firewall rule: {0}")]
    InvalidRule(String),

    #[error("Failed to run {binary}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to {action} firewall port {port}/tcp in zone {zone}: {status}{}", stderr_suffix(.stderr))]
    CommandFailed {
        action: RuleAction,
        port: u16,
        zone: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("failed to {action} firewall port {port}/tcp in zone {zone}: {reason}")]
    Rejected {
        action: RuleAction,
        port: u16,
        zone: String,
        reason: String,
    },

    #[error("Firewall task failed: {0}")]
    TaskFailed(String),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" ({})", trimmed)
    }
}

/// Result type for firewall operations
pub type FirewallResult<T> = Result<T, FirewallError>;

/// Transport protocol of a rule. Only TCP is ever opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
        }
    }
}

/// Whether a rule is being added or removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    Add,
    Remove,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Add => f.write_str("open"),
            RuleAction::Remove => f.write_str("remove"),
        }
    }
}

/// An allow rule for one port in one zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    port: u16,
    protocol: Protocol,
    zone: String,
}

impl FirewallRule {
    /// Create a TCP rule, rejecting port 0 and blank zones.
    pub fn tcp(port: u16, zone: impl Into<String>) -> FirewallResult<Self> {
        let zone = zone.into();
        if port == 0 {
            return Err(FirewallError::InvalidRule("port must be 1-65535".to_string()));
        }
        if zone.trim().is_empty() {
            return Err(FirewallError::InvalidRule("zone must not be empty".to_string()));
        }
        Ok(Self {
            port,
            protocol: Protocol::Tcp,
            zone,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} in zone {}", self.port, self.protocol, self.zone)
    }
}

/// Trait for firewall backends
///
/// Implementations mutate host firewall state and must not retry.
pub trait FirewallBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Add a temporary allow rule.
    fn open(&self, rule: &FirewallRule) -> FirewallResult<()>;

    /// Remove a rule previously added with `open`.
    fn close(&self, rule: &FirewallRule) -> FirewallResult<()>;
}

/// Hands out `OpenRule` claims for a backend.
#[derive(Clone)]
pub struct FirewallController {
    backend: Arc<dyn FirewallBackend>,
}

impl FirewallController {
    pub fn new(backend: Arc<dyn FirewallBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Open `rule` and return the claim that will remove it again.
    pub fn open(&self, rule: FirewallRule) -> FirewallResult<OpenRule> {
        self.backend.open(&rule)?;
        tracing::info!(
            port = rule.port(),
            zone = rule.zone(),
            backend = self.backend_name(),
            "Firewall port opened temporarily"
        );
        Ok(OpenRule {
            backend: Arc::clone(&self.backend),
            rule,
            closed: false,
        })
    }

    /// `open` on the blocking pool, for callers on an async runtime.
    ///
    /// If the returned future is dropped mid-call, the claim is dropped with
    /// the task result and the rule removed again.
    pub async fn open_async(&self, rule: FirewallRule) -> FirewallResult<OpenRule> {
        let controller = self.clone();
        tokio::task::spawn_blocking(move || controller.open(rule))
            .await
            .map_err(|e| FirewallError::TaskFailed(e.to_string()))?
    }
}

/// A rule this process added and still owns.
///
/// Closed exactly once: through `close`, or on drop if it was never closed
/// (error returns and panics unwinding past the owner).
pub struct OpenRule {
    backend: Arc<dyn FirewallBackend>,
    rule: FirewallRule,
    closed: bool,
}

impl OpenRule {
    pub fn rule(&self) -> &FirewallRule {
        &self.rule
    }

    /// Remove the rule.
    pub fn close(mut self) -> FirewallResult<()> {
        self.closed = true;
        self.remove()
    }

    /// `close` on the blocking pool.
    pub async fn close_async(self) -> FirewallResult<()> {
        tokio::task::spawn_blocking(move || self.close())
            .await
            .map_err(|e| FirewallError::TaskFailed(e.to_string()))?
    }

    fn remove(&self) -> FirewallResult<()> {
        self.backend.close(&self.rule)?;
        tracing::info!(
            port = self.rule.port(),
            zone = self.rule.zone(),
            "Firewall port removed"
        );
        Ok(())
    }
}

impl fmt::Debug for OpenRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRule")
            .field("backend", &self.backend.name())
            .field("rule", &self.rule)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for OpenRule {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        tracing::warn!(rule = %self.rule, "Firewall rule still open during unwind, removing it");
        if let Err(e) = self.remove() {
            tracing::error!(error = %e, "Port may still be open");
        }
    }
}

//! Mock firewall backend for testing.
//!
//! Records every call instead of touching host firewall state, and can be
//! configured to reject opens or closes.

use std::sync::{Arc, Mutex};

use super::{FirewallBackend, FirewallError, FirewallResult, FirewallRule, RuleAction};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallCall {
    pub action: RuleAction,
    pub rule: FirewallRule,
}

impl FirewallCall {
    pub fn new(action: RuleAction, rule: FirewallRule) -> Self {
        Self { action, rule }
    }
}

/// Configuration for mock firewall behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If set, `open` fails with this reason.
    pub open_error: Option<String>,
    /// If set, `close` fails with this reason.
    pub close_error: Option<String>,
}

/// Mock firewall backend.
///
/// Clones share the call log, so a test can keep one clone and hand the
/// other to the code under test.
///
/// ```ignore
/// use fling::firewall::mock::MockFirewall;
///
/// let mock = MockFirewall::new();
/// let controller = FirewallController::new(Arc::new(mock.clone()));
/// // ... run the code under test ...
/// assert_eq!(mock.calls().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockFirewall {
    config: Arc<MockConfig>,
    calls: Arc<Mutex<Vec<FirewallCall>>>,
}

impl MockFirewall {
    /// Mock that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config: Arc::new(config),
            calls: Arc::default(),
        }
    }

    /// Mock whose `open` always fails.
    pub fn failing_open() -> Self {
        Self::with_config(MockConfig {
            open_error: Some("simulated open failure".to_string()),
            ..Default::default()
        })
    }

    /// Mock whose `close` always fails.
    pub fn failing_close() -> Self {
        Self::with_config(MockConfig {
            close_error: Some("simulated close failure".to_string()),
            ..Default::default()
        })
    }

    /// All calls so far, in order. Failed calls are recorded too.
    pub fn calls(&self) -> Vec<FirewallCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Rules passed to `close`, in order.
    pub fn closes(&self) -> Vec<FirewallRule> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == RuleAction::Remove)
            .map(|c| c.rule)
            .collect()
    }

    fn record(&self, action: RuleAction, rule: &FirewallRule) -> FirewallResult<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(FirewallCall::new(action, rule.clone()));
        }

        let error = match action {
            RuleAction::Add => &self.config.open_error,
            RuleAction::Remove => &self.config.close_error,
        };

        match error {
            Some(reason) => Err(FirewallError::Rejected {
                action,
                port: rule.port(),
                zone: rule.zone().to_string(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl FirewallBackend for MockFirewall {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, rule: &FirewallRule) -> FirewallResult<()> {
        self.record(RuleAction::Add, rule)
    }

    fn close(&self, rule: &FirewallRule) -> FirewallResult<()> {
        self.record(RuleAction::Remove, rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_calls_in_order() {
        let mock = MockFirewall::new();
        let rule = FirewallRule::tcp(8080, "public").unwrap();

        mock.open(&rule).unwrap();
        mock.close(&rule).unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].action, RuleAction::Add);
        assert_eq!(calls[1].action, RuleAction::Remove);
    }

    #[test]
    fn test_clones_share_call_log() {
        let mock = MockFirewall::new();
        let other = mock.clone();
        let rule = FirewallRule::tcp(8080, "public").unwrap();

        other.open(&rule).unwrap();
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn test_failing_open_still_records() {
        let mock = MockFirewall::failing_open();
        let rule = FirewallRule::tcp(8080, "public").unwrap();

        let err = mock.open(&rule).unwrap_err();
        assert!(err.to_string().contains("simulated open failure"));
        assert_eq!(mock.calls().len(), 1);
        assert!(mock.close(&rule).is_ok());
    }

    #[test]
    fn test_mock_name() {
        assert_eq!(MockFirewall::new().name(), "mock");
    }
}

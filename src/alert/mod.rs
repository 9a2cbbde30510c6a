// Alert module
// Operator-facing notifications: startup, auth failures, queue pressure

pub mod gotify;
pub mod webhook;

use serde_json::Value;

/// How urgent an alert is. Backends drop alerts below their minimum level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Parse a configured level, falling back to warning like an unset level would
    pub fn parse_or_warning(level: &str) -> Self {
        level.parse().unwrap_or_else(|e| {
            log::warn!("{}, using WARNING", e);
            Self::Warning
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub severity: Severity,
    pub title: String,
    pub message: String,
    pub extra: Option<Value>,
}

impl Alert {
    pub fn new(severity: Severity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            message: message.into(),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Sink for alerts. Best effort: implementations log and swallow their own failures.
pub trait AlertPort {
    fn notify(&self, alert: &Alert);
}

/// Used when no alert backend is configured
pub struct NoopAlerts;

impl AlertPort for NoopAlerts {
    fn notify(&self, alert: &Alert) {
        log::debug!("Alert (no backend configured): {}: {}", alert.title, alert.message);
    }
}

/// Forwards every alert to each configured backend
pub struct AlertFanout {
    ports: Vec<Box<dyn AlertPort>>,
}

impl AlertFanout {
    pub fn new(ports: Vec<Box<dyn AlertPort>>) -> Self {
        Self { ports }
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl AlertPort for AlertFanout {
    fn notify(&self, alert: &Alert) {
        if self.ports.is_empty() {
            return NoopAlerts.notify(alert);
        }
        for port in &self.ports {
            port.notify(alert);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every alert it receives
    #[derive(Clone, Default)]
    pub(crate) struct RecordingAlerts {
        pub alerts: Rc<RefCell<Vec<Alert>>>,
    }

    impl RecordingAlerts {
        pub fn titles(&self) -> Vec<String> {
            self.alerts.borrow().iter().map(|a| a.title.clone()).collect()
        }
    }

    impl AlertPort for RecordingAlerts {
        fn notify(&self, alert: &Alert) {
            self.alerts.borrow_mut().push(alert.clone());
        }
    }

    #[test]
    fn severity_parses_loosely_and_orders() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!(" Warn ".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("loud".parse::<Severity>().is_err());
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Info < Severity::Warning);
    }

    #[test]
    fn fanout_reaches_every_port() {
        let first = RecordingAlerts::default();
        let second = RecordingAlerts::default();
        let fanout = AlertFanout::new(vec![Box::new(first.clone()), Box::new(second.clone())]);

        fanout.notify(&Alert::new(Severity::Error, "Auth", "bad key"));
        assert_eq!(first.titles(), vec!["Auth"]);
        assert_eq!(second.titles(), vec!["Auth"]);
    }
}

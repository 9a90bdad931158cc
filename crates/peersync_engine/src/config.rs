//! Configuration for member sessions and the coordinator.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Deadlines of the backend calls a session makes.
///
/// `scan` and `commit` bound a whole phase. `scan_record` and
/// `commit_record` bound a single backend call inside it, so one hung record
/// is caught without waiting for the phase deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimeouts {
    /// Connecting to the backend.
    pub connect: Duration,
    /// The whole change scan.
    pub scan: Duration,
    /// One record of the change scan.
    pub scan_record: Duration,
    /// The whole commit batch.
    pub commit: Duration,
    /// One record of the commit batch.
    pub commit_record: Duration,
    /// Finalizing the backend.
    pub finalize: Duration,
    /// Disconnecting, including cleanup after a failure.
    pub disconnect: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            scan: Duration::from_secs(300),
            scan_record: Duration::from_secs(30),
            commit: Duration::from_secs(300),
            commit_record: Duration::from_secs(30),
            finalize: Duration::from_secs(60),
            disconnect: Duration::from_secs(10),
        }
    }
}

impl PhaseTimeouts {
    /// Uses `timeout` for every phase and every record.
    #[must_use]
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: timeout,
            scan: timeout,
            scan_record: timeout,
            commit: timeout,
            commit_record: timeout,
            finalize: timeout,
            disconnect: timeout,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect(mut self, timeout: Duration) -> Self {
        self.connect = timeout;
        self
    }

    /// Sets the whole-scan and per-record scan timeouts.
    #[must_use]
    pub fn with_scan(mut self, phase: Duration, record: Duration) -> Self {
        self.scan = phase;
        self.scan_record = record;
        self
    }

    /// Sets the whole-batch and per-record commit timeouts.
    #[must_use]
    pub fn with_commit(mut self, phase: Duration, record: Duration) -> Self {
        self.commit = phase;
        self.commit_record = record;
        self
    }

    /// Sets the finalize timeout.
    #[must_use]
    pub fn with_finalize(mut self, timeout: Duration) -> Self {
        self.finalize = timeout;
        self
    }

    /// Sets the disconnect timeout.
    #[must_use]
    pub fn with_disconnect(mut self, timeout: Duration) -> Self {
        self.disconnect = timeout;
        self
    }
}

/// Configuration of one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Member id, unique within the group.
    pub member_id: String,
    /// Backend call deadlines.
    #[serde(default)]
    pub timeouts: PhaseTimeouts,
}

impl SessionConfig {
    /// Creates a configuration with default timeouts.
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            timeouts: PhaseTimeouts::default(),
        }
    }

    /// Sets the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: PhaseTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Configuration of the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Compare changes with no known entity against the other changes of
    /// the pass, so records created independently on several members are
    /// merged instead of copied.
    #[serde(default)]
    pub match_unmapped: bool,
}

impl CoordinatorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables matching of unmapped changes.
    #[must_use]
    pub fn with_match_unmapped(mut self, enabled: bool) -> Self {
        self.match_unmapped = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_builder() {
        let timeouts = PhaseTimeouts::uniform(Duration::from_secs(5))
            .with_connect(Duration::from_secs(1))
            .with_scan(Duration::from_secs(60), Duration::from_secs(2));

        assert_eq!(timeouts.connect, Duration::from_secs(1));
        assert_eq!(timeouts.scan, Duration::from_secs(60));
        assert_eq!(timeouts.scan_record, Duration::from_secs(2));
        assert_eq!(timeouts.commit, Duration::from_secs(5));
    }

    #[test]
    fn session_config_defaults() {
        let config = SessionConfig::new("phone");
        assert_eq!(config.member_id, "phone");
        assert_eq!(config.timeouts, PhaseTimeouts::default());
        assert!(!CoordinatorConfig::new().match_unmapped);
    }
}

//! Task phases and statuses.
//!
//! `Phase` is a coarse four-step progress marker derived from `Status`; it
//! is never persisted on its own, only recomputed from the stored status
//! on load, matching how the scheduler compares phases with plain integer
//! ordering (`phase <= instance.phase()`) to decide whether a backend has
//! made forward progress.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Phase {
    Queue = 1,
    Init = 2,
    Running = 3,
    Finished = 4,
}

impl Phase {
    pub fn next(self) -> Phase {
        match self {
            Phase::Queue => Phase::Init,
            Phase::Init => Phase::Running,
            Phase::Running | Phase::Finished => Phase::Finished,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Status {
    Queue,
    Init,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Killed,
}

impl Status {
    pub fn is_finished(self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Cancelled | Status::Killed)
    }

    pub fn phase(self) -> Phase {
        match self {
            Status::Queue => Phase::Queue,
            Status::Init => Phase::Init,
            Status::Running => Phase::Running,
            Status::Succeeded | Status::Failed | Status::Cancelled | Status::Killed => Phase::Finished,
        }
    }

    /// Maps an arbitrary backend-reported status string onto a known
    /// `Status`. Anything unrecognized is treated as "no progress yet"
    /// (`Init`) rather than erroring, since a misbehaving or unfamiliar
    /// adapter must not be able to wedge the scheduler.
    pub fn from_backend(raw: &str) -> Status {
        match raw {
            "Queue" => Status::Queue,
            "Init" => Status::Init,
            "Running" => Status::Running,
            "Succeeded" => Status::Succeeded,
            "Failed" => Status::Failed,
            "Cancelled" => Status::Cancelled,
            "Killed" => Status::Killed,
            _ => Status::Init,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queue => "Queue",
            Status::Init => "Init",
            Status::Running => "Running",
            Status::Succeeded => "Succeeded",
            Status::Failed => "Failed",
            Status::Cancelled => "Cancelled",
            Status::Killed => "Killed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-phase timeout durations, plus a whole-task ceiling. `Default`
/// matches the original defaults: a day to queue, a week to initialize, a
/// year to run, a year overall.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    pub queue: Duration,
    pub init: Duration,
    pub running: Duration,
    pub whole: Duration,
}

impl Default for Timeout {
    fn default() -> Self {
        const DAY: u64 = 24 * 3600;
        Self {
            queue: Duration::from_secs(DAY),
            init: Duration::from_secs(DAY * 7),
            running: Duration::from_secs(DAY * 365),
            whole: Duration::from_secs(DAY * 365),
        }
    }
}

impl Timeout {
    pub fn for_phase(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Queue => self.queue,
            Phase::Init => self.init,
            Phase::Running => self.running,
            Phase::Finished => self.whole,
        }
    }
}

/// The wire/config form of [`Timeout`]: every field optional, units are
/// minutes, zero/missing means "use the default for that phase".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TimeoutSetting {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub running: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whole: Option<u64>,
}

impl TimeoutSetting {
    /// Overlays non-zero/non-missing fields onto a base `Timeout`, leaving
    /// everything else at its default.
    pub fn resolve(&self, base: &Timeout) -> Timeout {
        let mut out = *base;
        if let Some(m) = self.queue.filter(|m| *m > 0) {
            out.queue = Duration::from_secs(m * 60);
        }
        if let Some(m) = self.init.filter(|m| *m > 0) {
            out.init = Duration::from_secs(m * 60);
        }
        if let Some(m) = self.running.filter(|m| *m > 0) {
            out.running = Duration::from_secs(m * 60);
        }
        if let Some(m) = self.whole.filter(|m| *m > 0) {
            out.whole = Duration::from_secs(m * 60);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_phase_mapping() {
        assert_eq!(Status::Queue.phase(), Phase::Queue);
        assert_eq!(Status::Running.phase(), Phase::Running);
        assert_eq!(Status::Killed.phase(), Phase::Finished);
    }

    #[test]
    fn is_finished_covers_all_terminal_statuses() {
        for s in [Status::Succeeded, Status::Failed, Status::Cancelled, Status::Killed] {
            assert!(s.is_finished());
        }
        for s in [Status::Queue, Status::Init, Status::Running] {
            assert!(!s.is_finished());
        }
    }

    #[test]
    fn unknown_backend_status_maps_to_init() {
        assert_eq!(Status::from_backend("bogus"), Status::Init);
    }

    #[test]
    fn phase_ordering_is_integer_comparison() {
        assert!(Phase::Init > Phase::Queue);
        assert!(Phase::Finished > Phase::Running);
    }

    #[test]
    fn timeout_setting_overlays_only_nonzero_fields() {
        let base = Timeout::default();
        let setting = TimeoutSetting { running: Some(30), ..Default::default() };
        let resolved = setting.resolve(&base);
        assert_eq!(resolved.running, Duration::from_secs(30 * 60));
        assert_eq!(resolved.queue, base.queue);
    }
}

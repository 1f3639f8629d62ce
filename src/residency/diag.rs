//! Anomalies the transition function reports instead of logging directly.

use crate::trace::{SwitchEvent, TaskId};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnomalyKind {
    /// Switch-out for a task never switched in on this CPU (trace started mid-run).
    SwitchOutWithoutSwitchIn,
    /// Switch-out for a task already marked not running.
    SwitchOutWhileNotRunning,
    /// Switch-in for a task already marked running.
    DuplicateSwitchIn,
}

impl AnomalyKind {
    pub fn describe(self) -> &'static str {
        match self {
            AnomalyKind::SwitchOutWithoutSwitchIn => "switch-out with no prior switch-in",
            AnomalyKind::SwitchOutWhileNotRunning => "switch-out while already not running",
            AnomalyKind::DuplicateSwitchIn => "switch-in for already running task",
        }
    }
}

/// A recoverable data-quality problem tied to one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub timestamp: u64,
    pub cpu: usize,
    pub task: TaskId,
    pub name: String,
}

impl Anomaly {
    pub fn outgoing(kind: AnomalyKind, event: &SwitchEvent) -> Self {
        Self {
            kind,
            timestamp: event.timestamp,
            cpu: event.cpu,
            task: event.prev.id,
            name: event.prev.name.clone(),
        }
    }

    pub fn incoming(kind: AnomalyKind, event: &SwitchEvent) -> Self {
        Self {
            kind,
            timestamp: event.timestamp,
            cpu: event.cpu,
            task: event.next.id,
            name: event.next.name.clone(),
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (ts={} cpu={} task={}:{})",
            self.kind.describe(),
            self.timestamp,
            self.cpu,
            self.name,
            self.task
        )
    }
}

/// Receiver for anomalies raised while folding events.
pub trait DiagnosticSink {
    fn anomaly(&mut self, anomaly: Anomaly);
}

/// Collects anomalies in memory.
impl DiagnosticSink for Vec<Anomaly> {
    fn anomaly(&mut self, anomaly: Anomaly) {
        self.push(anomaly);
    }
}

/// Forwards anomalies to the `log` facade and keeps per-kind counts.
///
/// Traces routinely start mid-run, so the first `verbose_limit` anomalies of
/// each kind go out at warn and the rest at debug.
#[derive(Debug, Default)]
pub struct LogSink {
    counts: BTreeMap<AnomalyKind, u64>,
    verbose_limit: u64,
}

impl LogSink {
    pub fn new(verbose_limit: u64) -> Self {
        Self {
            counts: BTreeMap::new(),
            verbose_limit,
        }
    }

    pub fn counts(&self) -> &BTreeMap<AnomalyKind, u64> {
        &self.counts
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

impl DiagnosticSink for LogSink {
    fn anomaly(&mut self, anomaly: Anomaly) {
        let n = self.counts.entry(anomaly.kind).or_default();
        *n += 1;
        if *n <= self.verbose_limit {
            log::warn!("{}", anomaly);
        } else {
            log::debug!("{}", anomaly);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::event::TaskRef;
    use pretty_assertions::assert_eq;

    #[test]
    fn log_sink_counts_by_kind() {
        let event = SwitchEvent {
            timestamp: 3,
            cpu: 0,
            prev: TaskRef::new(9, "kworker"),
            next: TaskRef::new(1, "init"),
        };
        let mut sink = LogSink::new(1);
        sink.anomaly(Anomaly::outgoing(AnomalyKind::SwitchOutWithoutSwitchIn, &event));
        sink.anomaly(Anomaly::outgoing(AnomalyKind::SwitchOutWithoutSwitchIn, &event));
        sink.anomaly(Anomaly::incoming(AnomalyKind::DuplicateSwitchIn, &event));

        assert_eq!(sink.total(), 3);
        assert_eq!(
            sink.counts().get(&AnomalyKind::SwitchOutWithoutSwitchIn),
            Some(&2)
        );
        assert_eq!(sink.counts().get(&AnomalyKind::DuplicateSwitchIn), Some(&1));
    }

    #[test]
    fn display_names_event_and_task() {
        let event = SwitchEvent {
            timestamp: 3,
            cpu: 2,
            prev: TaskRef::new(9, "kworker"),
            next: TaskRef::new(1, "init"),
        };
        let a = Anomaly::outgoing(AnomalyKind::SwitchOutWhileNotRunning, &event);
        assert_eq!(
            a.to_string(),
            "switch-out while already not running (ts=3 cpu=2 task=kworker:9)"
        );
    }
}

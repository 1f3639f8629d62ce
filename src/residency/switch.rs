//! The per-event transition.

use crate::Result;
use crate::residency::diag::{Anomaly, AnomalyKind, DiagnosticSink};
use crate::residency::record::ResidencyRecord;
use crate::residency::table::PerCpuTable;
use crate::trace::SwitchEvent;

use anyhow::bail;

impl PerCpuTable {
    /// Apply one switch event. Only `event.cpu`'s records change.
    ///
    /// Errors on a CPU outside the table or a timestamp older than the last
    /// one applied on that CPU; the table is left untouched in both cases.
    /// Inconsistent switch pairs are reported to `sink` and skipped.
    pub fn apply(&mut self, event: &SwitchEvent, sink: &mut dyn DiagnosticSink) -> Result<()> {
        let cpu = event.cpu;
        if cpu >= self.cpus.len() {
            bail!(
                "event #{} [{}]: cpu {} out of range, trace declares {} cpus",
                self.events,
                event,
                cpu,
                self.cpus.len()
            );
        }
        if let Some(last) = self.last_ts[cpu] {
            if event.timestamp < last {
                bail!(
                    "event #{} [{}]: timestamp goes backwards on cpu {} (last ts={})",
                    self.events,
                    event,
                    cpu,
                    last
                );
            }
        }
        self.last_ts[cpu] = Some(event.timestamp);
        self.events += 1;
        self.tasks.insert(event.prev.id);
        self.tasks.insert(event.next.id);

        let records = &mut self.cpus[cpu];

        match records.get_mut(&event.prev.id) {
            None => sink.anomaly(Anomaly::outgoing(
                AnomalyKind::SwitchOutWithoutSwitchIn,
                event,
            )),
            Some(r) if r.running => {
                r.stop(event.timestamp);
            }
            Some(_) => sink.anomaly(Anomaly::outgoing(
                AnomalyKind::SwitchOutWhileNotRunning,
                event,
            )),
        }

        match records.get_mut(&event.next.id) {
            None => {
                records.insert(
                    event.next.id,
                    ResidencyRecord::switched_in(
                        event.next.id,
                        event.next.name.clone(),
                        event.timestamp,
                    ),
                );
            }
            Some(r) if r.running => {
                sink.anomaly(Anomaly::incoming(AnomalyKind::DuplicateSwitchIn, event))
            }
            Some(r) => r.start(event.timestamp),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::residency::record::Run;
    use crate::trace::event::TaskRef;
    use pretty_assertions::assert_eq;

    fn ev(ts: u64, cpu: usize, prev: i32, next: i32) -> SwitchEvent {
        SwitchEvent {
            timestamp: ts,
            cpu,
            prev: TaskRef::new(prev, format!("t{}", prev)),
            next: TaskRef::new(next, format!("t{}", next)),
        }
    }

    #[test]
    fn first_switch_in_creates_running_record() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        table.apply(&ev(3, 0, -1, 5), &mut sink).unwrap();

        assert_eq!(
            table.record(0, 5),
            Some(&ResidencyRecord {
                task_id: 5,
                name: "t5".to_string(),
                running: true,
                last_start_time: 3,
                total_time: 0,
                max_run: None,
            })
        );
    }

    #[test]
    fn switch_out_without_record_leaves_table_alone() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        table.apply(&ev(0, 0, -1, 1), &mut sink).unwrap();
        sink.clear();
        let before = table.clone();

        table.apply(&ev(2, 0, 9, 2), &mut sink).unwrap();
        assert!(table.record(0, 9).is_none());
        // Only the incoming task gained a record; existing ones are as they were.
        assert_eq!(
            table
                .records()
                .filter(|(_, task, _)| *task != 2)
                .collect::<Vec<_>>(),
            before.records().collect::<Vec<_>>()
        );
        assert!(table.record(0, 2).unwrap().running);
        assert_eq!(
            sink,
            vec![Anomaly {
                kind: AnomalyKind::SwitchOutWithoutSwitchIn,
                timestamp: 2,
                cpu: 0,
                task: 9,
                name: "t9".to_string(),
            }]
        );
        // Task 9 is still part of the observed universe.
        assert!(table.task_ids().contains(&9));
    }

    #[test]
    fn duplicate_switch_in_keeps_first_start() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        table.apply(&ev(0, 0, -1, 1), &mut sink).unwrap();
        table.apply(&ev(4, 0, 2, 1), &mut sink).unwrap();

        let r = table.record(0, 1).unwrap();
        assert!(r.running);
        assert_eq!(r.last_start_time, 0);
        assert_eq!(
            sink.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![
                AnomalyKind::SwitchOutWithoutSwitchIn,
                AnomalyKind::SwitchOutWithoutSwitchIn,
                AnomalyKind::DuplicateSwitchIn,
            ]
        );
    }

    #[test]
    fn switch_out_while_not_running_is_ignored() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        table.apply(&ev(0, 0, -1, 1), &mut sink).unwrap();
        table.apply(&ev(5, 0, 1, 2), &mut sink).unwrap();
        sink.clear();

        table.apply(&ev(8, 0, 1, 2), &mut sink).unwrap();
        assert_eq!(table.record(0, 1).unwrap().total_time, 5);
        assert_eq!(
            sink.iter().map(|a| a.kind).collect::<Vec<_>>(),
            vec![AnomalyKind::SwitchOutWhileNotRunning, AnomalyKind::DuplicateSwitchIn]
        );
    }

    #[test]
    fn records_longest_run_bounds() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        for e in [
            ev(0, 0, -1, 1),
            ev(2, 0, 1, 0),
            ev(10, 0, 0, 1),
            ev(19, 0, 1, 0),
            ev(20, 0, 0, 1),
            ev(21, 0, 1, 0),
        ] {
            table.apply(&e, &mut sink).unwrap();
        }
        let r = table.record(0, 1).unwrap();
        assert_eq!(r.total_time, 12);
        assert_eq!(r.max_run, Some(Run { start: 10, end: 19 }));
        assert_eq!(table.record(0, 0).unwrap().total_time, 9);
    }

    #[test]
    fn other_cpus_are_untouched() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(2);
        table.apply(&ev(0, 1, -1, 3), &mut sink).unwrap();
        let cpu1 = table.cpus[1].clone();

        table.apply(&ev(1, 0, -1, 3), &mut sink).unwrap();
        table.apply(&ev(6, 0, 3, 0), &mut sink).unwrap();
        assert_eq!(table.cpus[1], cpu1);
        assert_eq!(table.record(0, 3).unwrap().total_time, 5);
        assert!(table.record(1, 3).unwrap().running);
    }

    #[test]
    fn backwards_timestamp_fails_and_leaves_state() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(2);
        table.apply(&ev(10, 0, -1, 1), &mut sink).unwrap();
        // Other CPUs have their own clock check.
        table.apply(&ev(4, 1, -1, 2), &mut sink).unwrap();
        let before = table.clone();

        let err = table.apply(&ev(9, 0, 1, 2), &mut sink).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("timestamp goes backwards on cpu 0"), "{}", msg);
        assert!(msg.contains("event #2"), "{}", msg);
        assert_eq!(table, before);
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let mut sink: Vec<Anomaly> = Vec::new();
        let mut table = PerCpuTable::new(1);
        table.apply(&ev(10, 0, -1, 1), &mut sink).unwrap();
        table.apply(&ev(10, 0, 1, 2), &mut sink).unwrap();
        assert_eq!(table.record(0, 1).unwrap().total_time, 0);
        assert!(table.record(0, 2).unwrap().running);
    }
}

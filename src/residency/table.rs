use crate::Result;
use crate::residency::record::ResidencyRecord;
use crate::trace::TaskId;

use anyhow::bail;
use std::collections::{BTreeMap, BTreeSet};

/// Per-CPU residency state: one map task id -> record for each CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerCpuTable {
    pub(crate) cpus: Vec<BTreeMap<TaskId, ResidencyRecord>>,
    /// Last timestamp applied on each CPU, for the ordering check.
    pub(crate) last_ts: Vec<Option<u64>>,
    /// Every task id seen on either side of a switch.
    pub(crate) tasks: BTreeSet<TaskId>,
    pub(crate) events: u64,
}

impl PerCpuTable {
    pub fn new(num_cpus: usize) -> Self {
        Self {
            cpus: vec![BTreeMap::new(); num_cpus],
            last_ts: vec![None; num_cpus],
            tasks: BTreeSet::new(),
            events: 0,
        }
    }

    pub fn num_cpus(&self) -> usize {
        self.cpus.len()
    }

    pub fn record(&self, cpu: usize, task: TaskId) -> Option<&ResidencyRecord> {
        self.cpus.get(cpu).and_then(|m| m.get(&task))
    }

    /// All records, ordered by (cpu, task id).
    pub fn records(&self) -> impl Iterator<Item = (usize, TaskId, &ResidencyRecord)> {
        self.cpus
            .iter()
            .enumerate()
            .flat_map(|(cpu, m)| m.iter().map(move |(task, r)| (cpu, *task, r)))
    }

    pub fn task_ids(&self) -> &BTreeSet<TaskId> {
        &self.tasks
    }

    pub fn events_applied(&self) -> u64 {
        self.events
    }

    pub fn last_timestamp(&self, cpu: usize) -> Option<u64> {
        self.last_ts.get(cpu).copied().flatten()
    }

    /// Records still running, i.e. whose current run is not yet in `total_time`.
    pub fn open_runs(&self) -> usize {
        self.records().filter(|(_, _, r)| r.running).count()
    }

    /// Account every open run as if each running task were switched out at
    /// `cutoff`. Returns how many runs were closed.
    ///
    /// Fails without touching the table if `cutoff` precedes any CPU's last
    /// applied event.
    pub fn close_open_runs(&mut self, cutoff: u64) -> Result<usize> {
        for cpu in 0..self.num_cpus() {
            if let Some(last) = self.last_timestamp(cpu) {
                if cutoff < last {
                    bail!(
                        "cannot close runs at ts={}: cpu {} already advanced to ts={}",
                        cutoff,
                        cpu,
                        last
                    );
                }
            }
        }

        let mut closed = 0;
        for (cpu, records) in self.cpus.iter_mut().enumerate() {
            for r in records.values_mut().filter(|r| r.running) {
                r.stop(cutoff);
                closed += 1;
            }
            if self.last_ts[cpu].is_some() {
                self.last_ts[cpu] = Some(cutoff);
            }
        }
        Ok(closed)
    }
}

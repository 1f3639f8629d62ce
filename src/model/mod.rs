//! Aggregation model: merge per-CPU residency records into report rows.

use crate::residency::PerCpuTable;
use crate::taskgroup::TaskGroupIndex;
use crate::trace::TaskId;
use crate::trace::event::IDLE_TASK;

use std::collections::BTreeMap;
use std::fmt;

/// Group id used for rows whose task group could not be resolved.
pub const UNKNOWN_TASK_GROUP: TaskId = -1;

/// Cgroup name for tasks absent from the cgroup map.
pub const NO_CGROUP: &str = "<none>";

/// Task -> cgroup membership, supplied by the caller.
pub type CgroupMap = BTreeMap<TaskId, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResidencyKind {
    Task,
    TaskGroup,
    Cgroup,
}

/// What a row accounts for. Ordering sorts rows by id within a kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResidencyKey {
    Task(TaskId),
    TaskGroup(TaskId),
    Cgroup(String),
}

impl ResidencyKey {
    pub fn kind(&self) -> ResidencyKind {
        match self {
            ResidencyKey::Task(_) => ResidencyKind::Task,
            ResidencyKey::TaskGroup(_) => ResidencyKind::TaskGroup,
            ResidencyKey::Cgroup(_) => ResidencyKind::Cgroup,
        }
    }
}

impl fmt::Display for ResidencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResidencyKey::Task(id) | ResidencyKey::TaskGroup(id) => write!(f, "{}", id),
            ResidencyKey::Cgroup(name) => f.write_str(name),
        }
    }
}

/// One output row: residency per CPU plus the sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidencyRow {
    pub key: ResidencyKey,
    pub name: String,
    /// Owning task group; `None` when unknown or not meaningful for the kind.
    pub task_group: Option<TaskId>,
    /// `per_cpu[i]` is the time spent on cpu i.
    pub per_cpu: Vec<u64>,
    pub total: u64,
    /// Longest single run on any CPU by any member task.
    pub max_runtime: u64,
    /// Number of task rows folded into this one (1 for task rows).
    pub members: usize,
}

impl ResidencyRow {
    fn empty(key: ResidencyKey, name: String, task_group: Option<TaskId>, num_cpus: usize) -> Self {
        Self {
            key,
            name,
            task_group,
            per_cpu: vec![0; num_cpus],
            total: 0,
            max_runtime: 0,
            members: 0,
        }
    }

    fn absorb(&mut self, row: &ResidencyRow) {
        for (acc, t) in self.per_cpu.iter_mut().zip(&row.per_cpu) {
            *acc += t;
        }
        self.total += row.total;
        self.max_runtime = self.max_runtime.max(row.max_runtime);
        self.members += row.members;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalsView {
    pub tasks: usize,
    pub tasks_with_group: usize,
    pub total_time: u64,
}

/// Per-task residency, one row per task id sorted by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidencyReport {
    pub num_cpus: usize,
    pub rows: Vec<ResidencyRow>,
    pub totals: TotalsView,
}

/// Merge the per-CPU table into one row per observed task id.
///
/// Ids only ever seen switching out still get a row, with zero residency.
/// The name is the one recorded on the lowest-numbered CPU the task ran on.
pub fn aggregate(table: &PerCpuTable, index: &TaskGroupIndex) -> ResidencyReport {
    let num_cpus = table.num_cpus();
    let mut rows = Vec::with_capacity(table.task_ids().len());

    for &task in table.task_ids() {
        let name = (0..num_cpus)
            .find_map(|cpu| table.record(cpu, task))
            .map(|r| r.name.clone())
            .unwrap_or_default();

        let mut row = ResidencyRow::empty(ResidencyKey::Task(task), name, index.get(task), num_cpus);
        row.members = 1;
        for cpu in 0..num_cpus {
            if let Some(r) = table.record(cpu, task) {
                row.per_cpu[cpu] = r.total_time;
                row.max_runtime = row.max_runtime.max(r.max_runtime());
            }
        }
        row.total = row.per_cpu.iter().sum();
        rows.push(row);
    }

    let totals = TotalsView {
        tasks: rows.len(),
        tasks_with_group: rows.iter().filter(|r| r.task_group.is_some()).count(),
        total_time: rows.iter().map(|r| r.total).sum(),
    };
    log::info!(
        "residency: {} tasks, {} with a task group, {} total time",
        totals.tasks,
        totals.tasks_with_group,
        totals.total_time
    );
    if table.open_runs() > 0 {
        log::debug!(
            "{} runs still open at end of stream are not included",
            table.open_runs()
        );
    }

    ResidencyReport {
        num_cpus,
        rows,
        totals,
    }
}

impl ResidencyReport {
    pub fn row(&self, task: TaskId) -> Option<&ResidencyRow> {
        let key = ResidencyKey::Task(task);
        self.rows
            .binary_search_by(|r| r.key.cmp(&key))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Busy time per CPU, i.e. everything but the idle task.
    pub fn cpu_totals(&self) -> Vec<u64> {
        let mut out = vec![0; self.num_cpus];
        for row in self
            .rows
            .iter()
            .filter(|r| r.key != ResidencyKey::Task(IDLE_TASK))
        {
            for (acc, t) in out.iter_mut().zip(&row.per_cpu) {
                *acc += t;
            }
        }
        out
    }

    /// Roll task rows up into one row per task group, sorted by group id.
    ///
    /// Tasks with no known group land under [`UNKNOWN_TASK_GROUP`]. A group
    /// is named after its leader (task id == group id) when the leader was
    /// seen, else after its first member.
    pub fn by_task_group(&self) -> Vec<ResidencyRow> {
        let mut groups: BTreeMap<TaskId, ResidencyRow> = BTreeMap::new();
        for row in &self.rows {
            let gid = row.task_group.unwrap_or(UNKNOWN_TASK_GROUP);
            let group = groups.entry(gid).or_insert_with(|| {
                let leader = match self.row(gid) {
                    Some(leader) if gid != UNKNOWN_TASK_GROUP => leader.name.clone(),
                    _ => row.name.clone(),
                };
                ResidencyRow::empty(
                    ResidencyKey::TaskGroup(gid),
                    leader,
                    row.task_group,
                    self.num_cpus,
                )
            });
            group.absorb(row);
        }
        groups.into_values().collect()
    }

    /// Roll task rows up into one row per cgroup, sorted by cgroup name.
    pub fn by_cgroup(&self, cgroups: &CgroupMap) -> Vec<ResidencyRow> {
        let mut groups: BTreeMap<&str, ResidencyRow> = BTreeMap::new();
        for row in &self.rows {
            let ResidencyKey::Task(task) = row.key else {
                continue;
            };
            let cg = cgroups.get(&task).map(String::as_str).unwrap_or(NO_CGROUP);
            groups
                .entry(cg)
                .or_insert_with(|| {
                    ResidencyRow::empty(
                        ResidencyKey::Cgroup(cg.to_string()),
                        cg.to_string(),
                        None,
                        self.num_cpus,
                    )
                })
                .absorb(row);
        }
        groups.into_values().collect()
    }
}

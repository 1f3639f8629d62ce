use serde::Deserialize;
use std::fmt;

/// Kernel task id (pid). The idle task is 0.
pub type TaskId = i32;

/// The idle task ("swapper/N") that occupies a CPU with no runnable work.
pub const IDLE_TASK: TaskId = 0;

/// One side of a context switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub id: TaskId,
    pub name: String,
}

impl TaskRef {
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A single scheduler context switch on one CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchEvent {
    pub timestamp: u64,
    pub cpu: usize,
    pub prev: TaskRef,
    pub next: TaskRef,
}

impl fmt::Display for SwitchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ts={} cpu={} prev={}:{} next={}:{}",
            self.timestamp, self.cpu, self.prev.name, self.prev.id, self.next.name, self.next.id
        )
    }
}

/// Raw record shape as it appears in the JSON-lines trace.
///
/// `prev_tgid` / `next_tgid` are optional; -1 means the converter could not
/// resolve the owning process.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchRecord {
    pub ts: u64,
    pub cpu: usize,
    pub prev_pid: TaskId,
    #[serde(default)]
    pub prev_comm: String,
    #[serde(default)]
    pub prev_tgid: Option<TaskId>,
    pub next_pid: TaskId,
    #[serde(default)]
    pub next_comm: String,
    #[serde(default)]
    pub next_tgid: Option<TaskId>,
}

impl SwitchRecord {
    /// (task, task group) pairs this record reveals. Unknown groups are dropped.
    pub fn task_groups(&self) -> impl Iterator<Item = (TaskId, TaskId)> + '_ {
        [
            (self.prev_pid, self.prev_tgid),
            (self.next_pid, self.next_tgid),
        ]
        .into_iter()
        .filter_map(|(pid, tgid)| match tgid {
            Some(t) if t >= 0 => Some((pid, t)),
            _ => None,
        })
    }

    pub fn into_event(self) -> SwitchEvent {
        SwitchEvent {
            timestamp: self.ts,
            cpu: self.cpu,
            prev: TaskRef::new(self.prev_pid, self.prev_comm),
            next: TaskRef::new(self.next_pid, self.next_comm),
        }
    }
}

use crate::trace::TaskId;

/// Bounds of one uninterrupted run on a CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    pub start: u64,
    pub end: u64,
}

impl Run {
    pub fn duration(&self) -> u64 {
        self.end - self.start
    }
}

/// Live residency state of one task on one CPU.
///
/// Created on the first switch-in of the task on that CPU and never removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidencyRecord {
    pub task_id: TaskId,
    /// Name from the first switch-in on this CPU.
    pub name: String,
    pub running: bool,
    pub last_start_time: u64,
    pub total_time: u64,
    /// Longest run seen so far; ties keep the earlier run.
    pub max_run: Option<Run>,
}

impl ResidencyRecord {
    /// A record for a task that has just been switched in at `ts`.
    pub fn switched_in(task_id: TaskId, name: impl Into<String>, ts: u64) -> Self {
        Self {
            task_id,
            name: name.into(),
            running: true,
            last_start_time: ts,
            total_time: 0,
            max_run: None,
        }
    }

    pub fn start(&mut self, ts: u64) {
        self.running = true;
        self.last_start_time = ts;
    }

    /// Close the current run at `ts` and return its length.
    ///
    /// Caller guarantees `running` and `ts >= last_start_time`.
    pub fn stop(&mut self, ts: u64) -> u64 {
        let runtime = ts - self.last_start_time;
        self.total_time += runtime;
        if self.max_run.is_none_or(|run| runtime > run.duration()) {
            self.max_run = Some(Run {
                start: self.last_start_time,
                end: ts,
            });
        }
        self.running = false;
        runtime
    }

    pub fn max_runtime(&self) -> u64 {
        self.max_run.map(|run| run.duration()).unwrap_or(0)
    }
}

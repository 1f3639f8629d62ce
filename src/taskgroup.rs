//! Task -> task group (owning process) mapping.

use crate::trace::event::IDLE_TASK;
use crate::trace::TaskId;
use std::collections::BTreeMap;

/// Task group of the idle task. The idle task never carries a real tgid in
/// a trace, so it is pinned here.
pub const IDLE_TASK_GROUP: TaskId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskGroupIndex {
    map: BTreeMap<TaskId, TaskId>,
}

impl Default for TaskGroupIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroupIndex {
    /// An index that only knows the idle task.
    pub fn new() -> Self {
        Self {
            map: BTreeMap::from([(IDLE_TASK, IDLE_TASK_GROUP)]),
        }
    }

    /// Build from (task, group) observations. Negative groups mean
    /// "unknown" and are skipped; a later observation for the same task
    /// replaces an earlier one.
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (TaskId, TaskId)>,
    {
        let mut index = Self::new();
        index.extend(observations);
        index
    }

    pub fn extend<I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = (TaskId, TaskId)>,
    {
        for (task, group) in observations {
            if group < 0 {
                continue;
            }
            self.map.insert(task, group);
        }
        self.map.insert(IDLE_TASK, IDLE_TASK_GROUP);
    }

    pub fn get(&self, task: TaskId) -> Option<TaskId> {
        self.map.get(&task).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, TaskId)> + '_ {
        self.map.iter().map(|(t, g)| (*t, *g))
    }
}

use crate::Result;
use crate::trace::event::{SwitchEvent, SwitchRecord, TaskId};

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;

/// A fully loaded trace: the switch events in file order plus every
/// (task, task group) pair the records revealed.
#[derive(Debug, Clone, Default)]
pub struct TraceFile {
    pub events: Vec<SwitchEvent>,
    pub task_groups: Vec<(TaskId, TaskId)>,
}

impl TraceFile {
    /// Smallest CPU count that covers every event, 0 for an empty trace.
    pub fn cpu_count(&self) -> usize {
        self.events.iter().map(|e| e.cpu + 1).max().unwrap_or(0)
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.events.iter().map(|e| e.timestamp).max()
    }
}

/// Parse a JSON-lines switch trace.
///
/// One object per line:
/// {"ts": 1000, "cpu": 0, "prev_pid": 0, "prev_comm": "swapper/0", "next_pid": 42, "next_comm": "sh"}
///
/// Blank lines and lines starting with '#' are skipped. Records are kept in
/// file order; ordering is checked later, while folding.
pub fn parse_trace_file(path: &str) -> Result<TraceFile> {
    let text = fs::read_to_string(path).with_context(|| format!("read trace file {}", path))?;
    parse_trace_str(&text, path)
}

pub fn parse_trace_str(text: &str, origin: &str) -> Result<TraceFile> {
    let mut out = TraceFile::default();
    for (lineno, line) in text.lines().enumerate() {
        let lno = lineno + 1;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: SwitchRecord = serde_json::from_str(line)
            .with_context(|| format!("trace parse error at {}:{}: {:?}", origin, lno, line))?;

        out.task_groups.extend(record.task_groups());
        out.events.push(record.into_event());
    }

    Ok(out)
}

/// Parse a task group override file: {"<pid>": <tgid>, ...}
pub fn parse_task_group_file(path: &str) -> Result<BTreeMap<TaskId, TaskId>> {
    let map: BTreeMap<TaskId, TaskId> = parse_json_map(path, "task group")?;
    if let Some((pid, tgid)) = map.iter().find(|(_, tgid)| **tgid < 0) {
        bail!(
            "task group file {} maps pid {} to invalid group {}",
            path,
            pid,
            tgid
        );
    }
    Ok(map)
}

/// Parse a cgroup membership file: {"<pid>": "<cgroup>", ...}
pub fn parse_cgroup_file(path: &str) -> Result<BTreeMap<TaskId, String>> {
    parse_json_map(path, "cgroup")
}

fn parse_json_map<V: DeserializeOwned>(path: &str, what: &str) -> Result<BTreeMap<TaskId, V>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {} file {}", what, path))?;
    serde_json::from_str(&text).with_context(|| format!("parse {} file {}", what, path))
}

//! Event source: structured `sched_switch` records produced upstream.

pub mod event;
pub mod parse;

pub use event::{SwitchEvent, TaskId};
pub use parse::parse_trace_file;

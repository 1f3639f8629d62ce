//! Residency engine: fold `sched_switch` events into per-CPU, per-task
//! running time.
//!
//! The engine owns no global state. A caller creates a [`PerCpuTable`],
//! drives [`PerCpuTable::apply`] once per event (or uses [`fold`]), and hands
//! the finished table to the aggregator in [`crate::model`].

pub mod diag;
pub mod record;
pub mod switch;
pub mod table;

pub use diag::{DiagnosticSink, LogSink};
pub use table::PerCpuTable;

use crate::Result;
use crate::trace::SwitchEvent;

/// Fold a time-ordered event stream into a fresh table.
///
/// Stops at the first precondition violation; anomalies go to `sink` and
/// never abort the fold.
pub fn fold<I>(events: I, num_cpus: usize, sink: &mut dyn DiagnosticSink) -> Result<PerCpuTable>
where
    I: IntoIterator<Item = SwitchEvent>,
{
    let mut table = PerCpuTable::new(num_cpus);
    for event in events {
        table.apply(&event, sink)?;
    }
    log::debug!(
        "folded {} switch events over {} cpus, {} tasks seen",
        table.events_applied(),
        num_cpus,
        table.task_ids().len()
    );
    Ok(table)
}

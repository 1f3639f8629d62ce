//! Plain-text rendering of residency rows.

pub mod table;

pub use table::{render_summary, render_table};

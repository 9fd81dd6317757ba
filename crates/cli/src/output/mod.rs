//! Output formatting for CLI results.

pub mod detail;
pub mod table;

pub use detail::{format_addresses_detail, format_plan_detail};
pub use table::{format_actions_table, format_steps_table};

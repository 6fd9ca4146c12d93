//! Stable exit codes for drafter CLI commands.

/// Command succeeded; for runs, the run completed.
pub const OK: i32 = 0;
/// Invalid input, config or run identity, or a failed step.
pub const INVALID: i32 = 1;
/// The run stopped at an interrupt and needs `drafter resume`.
pub const AWAITING_FEEDBACK: i32 = 2;

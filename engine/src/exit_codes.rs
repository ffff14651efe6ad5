//! Stable exit codes for the evaluation CLI.

/// Command succeeded and every evaluated task was correct.
pub const OK: i32 = 0;
/// Command failed: unreadable dataset, config, transcripts or results.
pub const INVALID: i32 = 1;
/// The session ran to the end but at least one evaluated task was not correct.
pub const TASKS_FAILED: i32 = 2;

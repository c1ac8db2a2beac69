//! Process exit codes.

/// The run completed, however many targets were exhausted.
pub const OK: i32 = 0;
/// Setup failed before any target was processed.
pub const SETUP_ERROR: i32 = 1;

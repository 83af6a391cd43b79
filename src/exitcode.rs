//! Process exit codes

/// Command completed; for exports, every page succeeded
pub const OK: i32 = 0;

/// Any failure: configuration, structure, output directory or a partial export
pub const FAILURE: i32 = 1;

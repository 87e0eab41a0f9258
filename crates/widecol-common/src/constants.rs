//! System-wide constants for widecol.

// =============================================================================
// Qualifier Grammar
// =============================================================================

/// Separator between the parts of a synthetic qualifier.
///
/// Synthetic qualifiers have the shape `<owner>#<member>#<index>`.
pub const QUALIFIER_DELIMITER: char = '#';

/// Index value reported for a row+attribute that has no recorded elements.
pub const NO_INDEX: i64 = -1;

// =============================================================================
// Scanning
// =============================================================================

/// Default number of rows fetched per cursor batch.
pub const DEFAULT_FETCH_SIZE: usize = 100;

/// Upper bound accepted for the cursor fetch size.
pub const MAX_FETCH_SIZE: usize = 100_000;

// =============================================================================
// Handle Pool
// =============================================================================

/// Default maximum number of handles per table.
pub const DEFAULT_MAX_HANDLES_PER_TABLE: usize = 16;

/// Default time to wait for a free handle, in milliseconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 30_000;

//! Centralised timing constants for polling reads and fee projection.
//!
//! | Constant                  | Value  |
//! |---------------------------|--------|
//! | `POLL_RETRY_DELAY_MS`     | 1 s    |
//! | `DECAY_TOLERANCE_SECS`    | 600 s  |

use std::time::Duration;

// ── Polling ─────────────────────────────────────────────────────────────────

/// Fixed pause between attempts of a polling read.
pub const POLL_RETRY_DELAY_MS: u64 = 1_000;

pub const POLL_RETRY_DELAY: Duration = Duration::from_millis(POLL_RETRY_DELAY_MS);

// ── Fee projection ──────────────────────────────────────────────────────────

/// How far ahead the borrowing fee is projected when checking that a trove
/// keeps the minimum net debt until the transaction lands.
pub const DECAY_TOLERANCE_SECS: u64 = 600;

/// `DECAY_TOLERANCE_SECS` in whole minutes, as reported to callers.
pub const DECAY_TOLERANCE_MINUTES: u64 = DECAY_TOLERANCE_SECS / SECS_PER_MINUTE;

const SECS_PER_MINUTE: u64 = 60;

// ── Compile-time sanity checks ──────────────────────────────────────────────

// The tolerance is reported in whole minutes.
const _: () = assert!(DECAY_TOLERANCE_SECS % SECS_PER_MINUTE == 0);

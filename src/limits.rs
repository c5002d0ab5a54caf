use crate::model::Ms;

// ── Equipment fields (characters, not bytes) ─────────────────────

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_SHORT_DESCRIPTION_LEN: usize = 200;
pub const MAX_FULL_DESCRIPTION_LEN: usize = 10_000;

// ── Reservation windows ──────────────────────────────────────────

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// One year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

// ── Pagination ───────────────────────────────────────────────────

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

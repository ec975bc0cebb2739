// Hard limits enforced by the engine. Requests beyond them are rejected, not truncated.

pub const MAX_RANGES_PER_DAY: usize = 4;
pub const MAX_NOTE_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;
pub const MAX_ORDER_ID_LEN: usize = 255;
pub const MAX_RESERVATIONS: usize = 1_000_000;
pub const MAX_PER_PAGE: u32 = 100;

/// Default time an order-less pending hold survives before the sweeper expires it.
pub const DEFAULT_HOLD_TTL_MS: i64 = 15 * 60 * 1000;

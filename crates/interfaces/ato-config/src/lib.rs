//! Central configuration constants for protocol limits and defaults.

/// Default backend address for the line-delimited JSON bridge.
pub const DEFAULT_BACKEND_ADDR: &str = "127.0.0.1:8501";

/// How long a request waits for its response before the local timeout fires (ms).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Lower bound accepted for a user-configured request timeout (ms).
pub const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;

/// First reconnect delay after the channel drops (ms). Doubles per failed attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 500;

/// Ceiling for the reconnect backoff (ms).
pub const RECONNECT_MAX_DELAY_MS: u64 = 10_000;

/// Capacity of the passive-observer broadcast channels.
pub const BROADCAST_CAPACITY: usize = 256;

/// Default board quantity used for cost estimates.
pub const DEFAULT_MANUFACTURING_QUANTITY: u32 = 1;

/// Minimum board quantity.
pub const MIN_MANUFACTURING_QUANTITY: u32 = 1;

/// Maximum board quantity.
pub const MAX_MANUFACTURING_QUANTITY: u32 = 10_000;

/// File types selected for export when the wizard opens.
pub const DEFAULT_EXPORT_FILE_TYPES: &[&str] = &["gerbers", "bom_csv", "pick_and_place"];

/// Convenience function to clamp a quantity into the allowed range.
pub fn clamp_quantity(v: u32) -> u32 {
    v.clamp(MIN_MANUFACTURING_QUANTITY, MAX_MANUFACTURING_QUANTITY)
}

/// Convenience function to keep a request timeout above the floor.
pub fn clamp_request_timeout(ms: u64) -> u64 {
    ms.max(MIN_REQUEST_TIMEOUT_MS)
}

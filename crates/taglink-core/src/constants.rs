//! Shared constants for the tag ingestion pipeline.
//!
//! Timing defaults, vendor field names and sentinel values used by more than
//! one crate live here so the hardware, pipeline and storage layers agree on
//! them.
//!
//! # Usage
//!
//! ```
//! use taglink_core::constants::*;
//! use std::time::Duration;
//!
//! let backoff = Duration::from_millis(DEFAULT_QUEUE_POLL_BACKOFF_MS);
//! assert_eq!(backoff.as_millis(), 100);
//! assert_eq!(DEFAULT_LLRP_PORT, 5084);
//! ```

// ============================================================================
// Reader link
// ============================================================================

/// Default TCP port of an LLRP reader.
pub const DEFAULT_LLRP_PORT: u16 = 5084;

/// Default bounded wait for a driver connect attempt, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default interval between simulated batches, in milliseconds.
pub const DEFAULT_SIMULATION_INTERVAL_MS: u64 = 2000;

/// Default bounded wait for a session's ingest worker to flush on disconnect.
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Ingestion queue and fan-out
// ============================================================================

/// Backoff applied by the broadcast loop when the ingestion queue is empty.
///
/// This bounds worst-case delivery latency when the queue was empty at the
/// last poll.
pub const DEFAULT_QUEUE_POLL_BACKOFF_MS: u64 = 100;

/// Default capacity of the ingestion queue before the oldest event is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default per-subscriber outbox capacity.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

// ============================================================================
// Tag data
// ============================================================================

/// Wire value used for readings that carried no identity.
pub const UNKNOWN_IDENTITY: &str = "N/A";

/// Seen count applied when a reading does not carry one.
pub const DEFAULT_SEEN_COUNT: u32 = 1;

/// Raw timestamps below this magnitude are interpreted as epoch seconds by
/// the automatic unit detection.
///
/// 1e11 seconds is roughly the year 5138, while 1e11 microseconds is
/// barely more than a day after the epoch.
pub const SECONDS_MAGNITUDE_LIMIT: f64 = 1e11;

/// Raw timestamps below this magnitude (and above [`SECONDS_MAGNITUDE_LIMIT`])
/// are interpreted as epoch milliseconds by the automatic unit detection.
pub const MILLIS_MAGNITUDE_LIMIT: f64 = 1e14;

/// Vendor keys carrying the tag identity, in lookup order.
pub const IDENTITY_KEYS: &[&str] = &["EPC-96", "EPC", "epc"];

/// Vendor keys carrying the antenna identifier, in lookup order.
pub const ANTENNA_KEYS: &[&str] = &["AntennaID", "antenna"];

/// Vendor keys carrying the peak signal strength, in lookup order.
pub const SIGNAL_KEYS: &[&str] = &["PeakRSSI", "rssi"];

/// Vendor keys carrying the observation timestamp, in lookup order.
pub const TIMESTAMP_KEYS: &[&str] = &["LastSeenTimestampUTC", "FirstSeenTimestampUTC", "timestamp"];

/// Vendor keys carrying the collapsed observation count, in lookup order.
pub const SEEN_COUNT_KEYS: &[&str] = &["TagSeenCount", "count"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_limits_are_ordered() {
        assert!(SECONDS_MAGNITUDE_LIMIT < MILLIS_MAGNITUDE_LIMIT);
        // A current epoch-seconds value sits well below the seconds limit
        assert!(1_700_000_000.0 < SECONDS_MAGNITUDE_LIMIT);
        // A current epoch-microseconds value sits above the millis limit
        assert!(1_700_000_000_000_000.0 > MILLIS_MAGNITUDE_LIMIT);
    }

    #[test]
    fn test_vendor_keys_prefer_llrp_names() {
        assert_eq!(IDENTITY_KEYS[0], "EPC-96");
        assert_eq!(ANTENNA_KEYS[0], "AntennaID");
        assert_eq!(SIGNAL_KEYS[0], "PeakRSSI");
        assert_eq!(TIMESTAMP_KEYS[0], "LastSeenTimestampUTC");
        assert_eq!(SEEN_COUNT_KEYS[0], "TagSeenCount");
    }
}

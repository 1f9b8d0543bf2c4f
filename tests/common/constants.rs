//! Shared constants for end-to-end tests
//!
//! When test data changes (user ids, subject ids, timeouts), update only
//! this file.

// ============================================================================
// Test Users
// ============================================================================

/// Regular test user
pub const TEST_USER: &str = "testuser";

/// A second user, for ownership and isolation checks
pub const OTHER_USER: &str = "otheruser";

// ============================================================================
// Test Subject IDs
// ============================================================================

pub const TRACK_1_ID: &str = "track-1";
pub const TRACK_2_ID: &str = "track-2";
pub const TRACK_3_ID: &str = "track-3";
pub const ALBUM_1_ID: &str = "album-1";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Interval between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

/// Timeout applied to every request made by the test client
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

//! Monotonic commit timestamps.

use chrono::{DateTime, Duration, Utc};

/// Returns the commit time for a new version.
///
/// If `previous` is given, the result is strictly greater than it (by at least 1 ms), so
/// commit times within one history never tie or go backwards even if the wall clock does.
///
/// Must be called while holding the lock that serialises commits for the resource.
pub fn next_commit_time(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

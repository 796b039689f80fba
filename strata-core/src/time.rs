//! Wall-clock helpers.

use chrono::Utc;

/// Current wall-clock time in epoch milliseconds, the unit used by cache
/// fields, queue scores and blob user metadata.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

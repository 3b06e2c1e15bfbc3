use chrono::{SecondsFormat, Utc};

/// Wall-clock timestamp in the bus's RFC 3339 millisecond format.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

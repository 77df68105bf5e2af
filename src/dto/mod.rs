use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Room chat requests and views.
pub mod chat;
/// Room change notifications.
pub mod events;
/// Room requests and per-viewer room views.
pub mod room;
/// Scenario requests and views.
pub mod scenario;
/// Shared field validators.
pub mod validation;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Inverse of [`format_system_time`], accepting any RFC 3339 offset.
pub(crate) fn parse_system_time(value: &str) -> Result<SystemTime, time::error::Parse> {
    OffsetDateTime::parse(value.trim(), &Rfc3339).map(SystemTime::from)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn timestamps_survive_formatting() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_250);
        assert_eq!(parse_system_time(&format_system_time(at)).unwrap(), at);
        assert!(parse_system_time("yesterday").is_err());
    }
}

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Lookback used to decide which remote files a run synchronizes.
pub const FRESHNESS_WINDOW: Duration = Duration::minutes(15);

/// A file is fresh when it was modified at or after `now - window`.
///
/// `now` is captured once per run and threaded through the whole walk, so
/// the threshold cannot drift while a traversal is in flight.
pub fn is_fresh(modified: OffsetDateTime, now: OffsetDateTime, window: Duration) -> bool {
    modified >= now - window
}

pub fn parse_modified(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(raw, &Rfc3339)
}

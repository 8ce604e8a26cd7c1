//! Episode anchor selection and the next-entry time suggestion.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::record::VitalSignRecord;
use crate::time::{Clock, RawTimestamp, TimeParser};

/// Elapsed time after which the charting cadence widens.
pub const CADENCE_THRESHOLD_MINUTES: i64 = 30;
pub const EARLY_STEP_MINUTES: i64 = 5;
pub const LATE_STEP_MINUTES: i64 = 10;

/// Which branch of the policy produced the anchor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    DeclaredStart,
    LastRecord,
    Clock,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Anchor {
    pub instant: DateTime<Utc>,
    pub source: AnchorSource,
}

/// Reference instant of an episode: declared start, else the chronologically
/// last record, else the clock.
pub fn resolve_anchor<C: Clock>(
    declared_start: Option<&RawTimestamp>,
    records: &[VitalSignRecord],
    parser: &TimeParser<C>,
) -> DateTime<Utc> {
    resolve_anchor_with_source(declared_start, records, parser).instant
}

pub fn resolve_anchor_with_source<C: Clock>(
    declared_start: Option<&RawTimestamp>,
    records: &[VitalSignRecord],
    parser: &TimeParser<C>,
) -> Anchor {
    if let Some(instant) = declared_start.and_then(|raw| parser.parse(raw, None)) {
        return Anchor {
            instant,
            source: AnchorSource::DeclaredStart,
        };
    }

    let placed = records.iter().filter_map(|record| placed_instant(record, parser));
    if let Some(instant) = placed.max() {
        return Anchor {
            instant,
            source: AnchorSource::LastRecord,
        };
    }

    Anchor {
        instant: parser.now(),
        source: AnchorSource::Clock,
    }
}

/// The record's resolved instant, or its raw time parsed without a reference.
pub fn placed_instant<C: Clock>(
    record: &VitalSignRecord,
    parser: &TimeParser<C>,
) -> Option<DateTime<Utc>> {
    record
        .instant
        .or_else(|| record.timestamp.as_ref().and_then(|raw| parser.parse(raw, None)))
}

/// Latest resolved instant among the records, ignoring unplaced ones.
///
/// Only `instant` is read. Records straight from a document have none until
/// they pass through [`SeriesStore::load`](crate::SeriesStore::load), which
/// resolves time-only entries against the anchor.
pub fn last_instant(records: &[VitalSignRecord]) -> Option<DateTime<Utc>> {
    records.iter().filter_map(|record| record.instant).max()
}

/// 5 minutes while under 30 minutes from the anchor, 10 minutes afterwards.
pub fn cadence_step(elapsed: Duration) -> Duration {
    if elapsed < Duration::minutes(CADENCE_THRESHOLD_MINUTES) {
        Duration::minutes(EARLY_STEP_MINUTES)
    } else {
        Duration::minutes(LATE_STEP_MINUTES)
    }
}

/// Suggested instant for the next manual entry.
///
/// Expects loaded records (see [`last_instant`]). At the very end of the
/// representable range the last instant itself is suggested.
pub fn suggest_next_time(anchor: DateTime<Utc>, records: &[VitalSignRecord]) -> DateTime<Utc> {
    match last_instant(records) {
        None => anchor,
        Some(last) => last
            .checked_add_signed(cadence_step(last - anchor))
            .unwrap_or(last),
    }
}

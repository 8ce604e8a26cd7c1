//! Timestamp normalization.
//!
//! Times reach the chart in many shapes: already-typed instants, backend
//! timestamp objects, epoch numbers, ISO strings, bare `HH:MM` entries and the
//! long Portuguese phrase produced by the backend console export
//! (`14 de março de 2024 às 10:30:00 UTC-3`). [`TimeParser`] turns all of them
//! into one UTC instant and never fails loudly: unparseable input is `None`.

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, SecondsFormat, TimeZone,
    Utc,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::record::fold_accents;
use crate::VitalsConfig;

/// Epoch magnitudes below this are seconds, at or above it milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant, for deterministic callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Every timestamp representation accepted by the chart.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    /// An already-typed instant.
    Native(DateTime<Utc>),
    /// Backend timestamp object (`{ seconds, nanoseconds }`).
    Backend {
        seconds: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        nanoseconds: Option<i64>,
    },
    /// Seconds or milliseconds since the Unix epoch.
    Epoch(f64),
    /// Any textual form; see [`TextShape`].
    Text(String),
}

impl RawTimestamp {
    /// Discriminates a JSON value into a timestamp shape.
    ///
    /// `null`, blank strings and objects without a numeric `seconds` member
    /// yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64().map(RawTimestamp::Epoch),
            Value::String(text) if !text.trim().is_empty() => {
                Some(RawTimestamp::Text(text.clone()))
            }
            Value::Object(map) => {
                let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?;
                let seconds = seconds
                    .as_i64()
                    .or_else(|| seconds.as_f64().filter(|s| s.is_finite()).map(|s| s.trunc() as i64))?;
                let nanoseconds = map
                    .get("nanoseconds")
                    .or_else(|| map.get("_nanoseconds"))
                    .and_then(|nanos| {
                        nanos
                            .as_i64()
                            .or_else(|| nanos.as_f64().filter(|n| n.is_finite()).map(|n| n as i64))
                    });
                Some(RawTimestamp::Backend {
                    seconds,
                    nanoseconds,
                })
            }
            _ => None,
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        RawTimestamp::Native(value)
    }
}

impl From<&str> for RawTimestamp {
    fn from(value: &str) -> Self {
        RawTimestamp::Text(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RawTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RawTimestamp::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("unsupported timestamp: {value}")))
    }
}

/// Reads an optional timestamp, mapping unsupported shapes to `None` instead
/// of rejecting the whole document.
pub(crate) fn deserialize_lenient<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<RawTimestamp>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let raw = RawTimestamp::from_json(&value);
    if raw.is_none() && !value.is_null() {
        tracing::trace!(%value, "ignoring unsupported timestamp shape");
    }
    Ok(raw)
}

/// Shape of a textual timestamp that is not a generic date string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextShape {
    Generic,
    TimeOnly,
    LongForm,
    Unrecognized,
}

impl TextShape {
    pub fn of(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            TextShape::Unrecognized
        } else if split_clock(trimmed).is_some() {
            TextShape::TimeOnly
        } else if looks_long_form(trimmed) {
            TextShape::LongForm
        } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) || trimmed.contains(',') {
            TextShape::Generic
        } else {
            TextShape::Unrecognized
        }
    }
}

/// Converts raw timestamps into UTC instants.
#[derive(Debug, Clone)]
pub struct TimeParser<C = SystemClock> {
    clock: C,
    local_offset: FixedOffset,
}

impl TimeParser<SystemClock> {
    /// A UTC parser reading the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TimeParser<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TimeParser<C> {
    /// A UTC parser reading `clock` for "now" and for time-only input
    /// without a reference day.
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            local_offset: Utc.fix(),
        }
    }

    /// A parser using the configured local offset.
    pub fn from_config(config: &VitalsConfig, clock: C) -> Self {
        Self::with_clock(clock).local_offset(config.local_offset())
    }

    /// Offset used for calendar days of `HH:MM` input and naive date strings.
    pub fn local_offset(mut self, offset: FixedOffset) -> Self {
        self.local_offset = offset;
        self
    }

    /// The local offset, also used to render clock times.
    pub fn offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// The injected clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Current instant according to the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Resolves any supported shape. `reference` supplies the calendar day for
    /// time-only strings and defaults to the clock.
    pub fn parse(
        &self,
        raw: &RawTimestamp,
        reference: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match raw {
            RawTimestamp::Native(instant) => Some(*instant),
            RawTimestamp::Backend {
                seconds,
                nanoseconds,
            } => backend_instant(*seconds, nanoseconds.unwrap_or(0)),
            RawTimestamp::Epoch(value) => epoch_instant(*value),
            RawTimestamp::Text(text) => self.parse_text(text, reference),
        }
    }

    /// [`parse`](Self::parse) for an untyped JSON value.
    pub fn parse_json(&self, value: &Value, reference: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        RawTimestamp::from_json(value).and_then(|raw| self.parse(&raw, reference))
    }

    pub fn parse_text(&self, text: &str, reference: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(instant) = self.parse_generic(trimmed) {
            return Some(instant);
        }

        let parsed = match TextShape::of(trimmed) {
            TextShape::TimeOnly => {
                let reference = reference.unwrap_or_else(|| self.clock.now());
                self.parse_time_of_day(trimmed, reference)
            }
            TextShape::LongForm => parse_long_form(trimmed),
            TextShape::Generic | TextShape::Unrecognized => None,
        };

        if parsed.is_none() {
            tracing::trace!(input = trimmed, "timestamp could not be parsed");
        }
        parsed
    }

    fn parse_generic(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
            return Some(dt.with_timezone(&Utc));
        }

        let normalized = match text.strip_suffix(|c: char| c == 'Z' || c == 'z') {
            Some(head) => format!("{head}+00:00"),
            None => text.to_string(),
        };
        for format in OFFSET_FORMATS {
            if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
                return Some(dt.with_timezone(&Utc));
            }
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return self.from_local(naive);
            }
        }

        // ISO date-only forms are UTC midnight; slash dates are local midnight.
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, "%Y/%m/%d") {
            return self.from_local(date.and_time(NaiveTime::MIN));
        }

        if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
            let year = text.parse::<i32>().ok()?;
            let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
            return Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)));
        }

        None
    }

    fn parse_time_of_day(&self, text: &str, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (hour, minute, second) = split_clock(text)?;
        let time = NaiveTime::from_hms_opt(hour, minute, second)?;
        let day = reference.with_timezone(&self.local_offset).date_naive();
        self.from_local(day.and_time(time))
    }

    fn from_local(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        self.local_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

fn backend_instant(seconds: i64, nanoseconds: i64) -> Option<DateTime<Utc>> {
    let millis = seconds
        .checked_mul(1000)?
        .checked_add(nanoseconds.div_euclid(1_000_000))?;
    Utc.timestamp_millis_opt(millis).single()
}

fn epoch_instant(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value.abs() < EPOCH_MILLIS_THRESHOLD {
        (value * 1000.0).trunc()
    } else {
        value.trunc()
    };
    if millis.abs() > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

/// Splits `HH:MM` or `HH:MM:SS`; hour may have one digit.
fn split_clock(text: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = text.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }
    let digits = |part: &str, min_len: usize| -> bool {
        (min_len..=2).contains(&part.len()) && part.bytes().all(|b| b.is_ascii_digit())
    };
    if !digits(parts[0], 1) || !parts[1..].iter().all(|part| digits(*part, 2)) {
        return None;
    }
    let hour = parts[0].parse().ok()?;
    let minute = parts[1].parse().ok()?;
    let second = match parts.get(2) {
        Some(part) => part.parse().ok()?,
        None => 0,
    };
    Some((hour, minute, second))
}

fn looks_long_form(text: &str) -> bool {
    let folded = fold_accents(text);
    folded.contains(" de ") && (folded.contains("utc") || folded.contains("gmt"))
}

/// Parses `<day> de <month> de <year> ... <HH:MM[:SS]> ... UTC<±offset>`.
fn parse_long_form(text: &str) -> Option<DateTime<Utc>> {
    let folded = fold_accents(text);
    let tokens: Vec<&str> = folded
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| c == ',' || c == '.'))
        .collect();

    let (date, rest) = tokens.windows(5).enumerate().find_map(|(index, window)| {
        let day = window[0].parse::<u32>().ok()?;
        if window[1] != "de" || window[3] != "de" || window[4].len() != 4 {
            return None;
        }
        let month = month_number(window[2])?;
        let year = window[4].parse::<i32>().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        Some((date, &tokens[index + 5..]))
    })?;

    let time_index = rest.iter().position(|token| split_clock(token).is_some())?;
    let (hour, minute, second) = split_clock(rest[time_index])?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;

    let tail = rest[time_index + 1..].join(" ");
    let offset = parse_utc_offset(&tail)?;

    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "janeiro" | "jan" => 1,
        "fevereiro" | "fev" => 2,
        "marco" | "mar" => 3,
        "abril" | "abr" => 4,
        "maio" | "mai" => 5,
        "junho" | "jun" => 6,
        "julho" | "jul" => 7,
        "agosto" | "ago" => 8,
        "setembro" | "set" => 9,
        "outubro" | "out" => 10,
        "novembro" | "nov" => 11,
        "dezembro" | "dez" => 12,
        _ => return None,
    };
    Some(month)
}

/// Reads the offset after `utc`/`gmt`: `-3`, `+05:30`, `-0300`, `−4`. A bare
/// marker means UTC.
fn parse_utc_offset(text: &str) -> Option<FixedOffset> {
    let start = text.find("utc").or_else(|| text.find("gmt"))?;
    let after = text[start + 3..].trim_start();

    let mut chars = after.chars();
    let sign = match chars.next() {
        Some('+') => 1,
        Some('-') | Some('\u{2212}') | Some('\u{2013}') => -1,
        _ => return FixedOffset::east_opt(0),
    };

    let body: String = chars
        .as_str()
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ':')
        .collect();
    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if body.len() == 4 => (body[..2].parse().ok()?, body[2..].parse().ok()?),
        None if !body.is_empty() && body.len() <= 2 => (body.parse().ok()?, 0),
        None => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// `HH:MM` in the given offset, the format used by manual entry.
pub fn format_clock_time(instant: DateTime<Utc>, offset: FixedOffset) -> String {
    instant.with_timezone(&offset).format("%H:%M").to_string()
}

/// RFC 3339 with second precision and a `Z` suffix.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

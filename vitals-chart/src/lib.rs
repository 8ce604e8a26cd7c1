//! Projection of an episode's vital signs onto chart coordinates.
//!
//! The projector is a pure function of the records, the anchor and a
//! [`ChartConfig`]; the renderer only draws what it receives.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use vitals_core::{round_half_up, RecordId, VitalField, VitalSignRecord};

/// Layout constants and per-series label spacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChartConfig {
    /// Added above the rounded maximum of the Y axis.
    pub y_headroom: f64,
    /// Empty minutes on each side of the plotted range.
    pub x_padding_minutes: i64,
    pub tick_minutes: i64,
    /// Minimum minutes between two visible labels of the same series.
    /// Missing series use 0, so every label is shown. Gaps read from a
    /// config are merged over the defaults rather than replacing them.
    #[serde(deserialize_with = "merge_label_gaps")]
    pub label_gaps: BTreeMap<VitalField, i64>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            y_headroom: 30.0,
            x_padding_minutes: 10,
            tick_minutes: 10,
            label_gaps: BTreeMap::from([
                (VitalField::MeanArterialPressure, 10),
                (VitalField::Spo2, 15),
                (VitalField::HeartRate, 10),
                (VitalField::Etco2, 15),
            ]),
        }
    }
}

fn merge_label_gaps<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<VitalField, i64>, D::Error> {
    let mut gaps = ChartConfig::default().label_gaps;
    gaps.extend(BTreeMap::<VitalField, i64>::deserialize(deserializer)?);
    Ok(gaps)
}

impl ChartConfig {
    pub fn label_gap(&self, field: VitalField) -> i64 {
        self.label_gaps.get(&field).copied().unwrap_or(0)
    }
}

/// One plotted observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub id: RecordId,
    pub relative_minute: i64,
    pub instant: DateTime<Utc>,
    pub values: BTreeMap<VitalField, f64>,
    /// Whether the numeric label of each present series is drawn at this point.
    pub label_visible: BTreeMap<VitalField, bool>,
}

impl ChartPoint {
    pub fn value(&self, field: VitalField) -> Option<f64> {
        self.values.get(&field).copied()
    }

    pub fn shows_label(&self, field: VitalField) -> bool {
        self.label_visible.get(&field).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoints {
    pub points: Vec<ChartPoint>,
    /// Inclusive minute range relative to the anchor.
    pub x_domain: (i64, i64),
    pub y_domain: (f64, f64),
    /// Minutes at which the X axis is marked.
    pub ticks: Vec<i64>,
}

/// Whole minutes between `anchor` and `instant`, rounding halves up.
pub fn relative_minute(anchor: DateTime<Utc>, instant: DateTime<Utc>) -> i64 {
    let millis = (instant - anchor).num_milliseconds();
    round_half_up(millis as f64 / 60_000.0) as i64
}

/// Maps records to chart coordinates.
///
/// Records that cannot be placed in time are left out. Points come out in
/// chronological order regardless of the input order.
pub fn project(
    records: &[VitalSignRecord],
    anchor: DateTime<Utc>,
    config: &ChartConfig,
) -> ChartPoints {
    let mut placed: Vec<(&VitalSignRecord, DateTime<Utc>)> = records
        .iter()
        .filter_map(|record| record.instant.map(|instant| (record, instant)))
        .collect();
    let skipped = records.len() - placed.len();
    if skipped > 0 {
        tracing::debug!(skipped, "records without instant left off the chart");
    }
    placed.sort_by_key(|(_, instant)| *instant);

    let mut points: Vec<ChartPoint> = placed
        .into_iter()
        .map(|(record, instant)| {
            let values = record.vitals.numbers();
            let label_visible = values.keys().map(|field| (*field, true)).collect();
            ChartPoint {
                id: record.id.clone(),
                relative_minute: relative_minute(anchor, instant),
                instant,
                values,
                label_visible,
            }
        })
        .collect();

    let fields: Vec<VitalField> = VitalField::ALL
        .into_iter()
        .filter(|field| points.iter().any(|point| point.values.contains_key(field)))
        .collect();
    for field in fields {
        let kept = kept_labels(&points, field, config.label_gap(field));
        let mut kept = kept.into_iter().peekable();
        for (index, point) in points.iter_mut().enumerate() {
            if !point.values.contains_key(&field) {
                continue;
            }
            let visible = kept.next_if_eq(&index).is_some();
            point.label_visible.insert(field, visible);
        }
    }

    let x_domain = x_domain(&points, config.x_padding_minutes);
    ChartPoints {
        y_domain: y_domain(&points, config.y_headroom),
        ticks: ticks(x_domain, config.tick_minutes),
        x_domain,
        points,
    }
}

/// Points of `field` whose label survives the minimum spacing.
///
/// Walks the points in order and keeps a label only when it is at least
/// `min_gap_minutes` after the last kept one. The first label is always kept.
pub fn declutter_labels(
    points: &[ChartPoint],
    field: VitalField,
    min_gap_minutes: i64,
) -> Vec<&ChartPoint> {
    kept_labels(points, field, min_gap_minutes)
        .into_iter()
        .map(|index| &points[index])
        .collect()
}

fn kept_labels(points: &[ChartPoint], field: VitalField, min_gap_minutes: i64) -> Vec<usize> {
    let mut kept = Vec::new();
    let mut last: Option<i64> = None;
    for (index, point) in points.iter().enumerate() {
        if !point.values.contains_key(&field) {
            continue;
        }
        let far_enough = last.map_or(true, |last| point.relative_minute - last >= min_gap_minutes);
        if far_enough {
            kept.push(index);
            last = Some(point.relative_minute);
        }
    }
    kept
}

fn x_domain(points: &[ChartPoint], padding: i64) -> (i64, i64) {
    let minutes = points.iter().map(|point| point.relative_minute);
    let min = minutes.clone().min().unwrap_or(0).min(0);
    let max = minutes.max().unwrap_or(0);
    (min - padding, max + padding)
}

/// Scaled on systolic pressure, the highest series normally drawn.
fn y_domain(points: &[ChartPoint], headroom: f64) -> (f64, f64) {
    let highest = |field: Option<VitalField>| {
        points
            .iter()
            .flat_map(|point| {
                point
                    .values
                    .iter()
                    .filter(move |(key, _)| field.map_or(true, |field| **key == field))
                    .map(|(_, value)| *value)
            })
            .fold(None, |max: Option<f64>, value| {
                Some(max.map_or(value, |max| max.max(value)))
            })
    };

    match highest(Some(VitalField::Systolic)).or_else(|| highest(None)) {
        Some(max) => (0.0, (max / 10.0).ceil() * 10.0 + headroom),
        None => (0.0, headroom),
    }
}

fn ticks((start, end): (i64, i64), step: i64) -> Vec<i64> {
    if step <= 0 {
        return Vec::new();
    }
    let first = start + (step - start.rem_euclid(step)) % step;
    (0..)
        .map(|n| first + n * step)
        .take_while(|minute| *minute <= end)
        .collect()
}

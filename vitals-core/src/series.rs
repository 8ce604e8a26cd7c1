//! Ordered, uniquely identified record series for one clinical episode.
//!
//! [`SeriesState`] is an immutable snapshot. Every [`SeriesStore`] operation
//! takes the current snapshot and returns a new one, re-sorted by instant,
//! leaving the caller's copy untouched. Callers serialize mutations per
//! episode and persist the returned list themselves.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{RecordId, VitalField, VitalPatch, VitalSignRecord};
use crate::time::{Clock, SystemClock, TimeParser};
use crate::validation::validate_edit;
use crate::VitalsError;

/// Ordered list of records, ascending by instant with unplaced records last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SeriesState {
    records: Vec<VitalSignRecord>,
}

impl SeriesState {
    pub fn records(&self) -> &[VitalSignRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<VitalSignRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&VitalSignRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VitalSignRecord> {
        self.records.iter()
    }
}

/// Explicit confirmation that the whole series should be erased.
///
/// Only constructible through [`ClearAllRequest::confirmed`], so a plain
/// delete can never be mistaken for a clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearAllRequest {
    _confirmed: (),
}

impl ClearAllRequest {
    pub fn confirmed() -> Self {
        Self { _confirmed: () }
    }
}

/// Applies mutations to a [`SeriesState`].
#[derive(Debug, Clone)]
pub struct SeriesStore<C = SystemClock> {
    parser: TimeParser<C>,
    reference: Option<DateTime<Utc>>,
}

impl Default for SeriesStore<SystemClock> {
    fn default() -> Self {
        Self::new(TimeParser::new())
    }
}

impl<C: Clock> SeriesStore<C> {
    /// A store that places raw times with `parser` and no calendar reference.
    pub fn new(parser: TimeParser<C>) -> Self {
        Self {
            parser,
            reference: None,
        }
    }

    /// Calendar reference for time-only entries, usually the episode anchor.
    pub fn with_reference(mut self, reference: DateTime<Utc>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Parser used to place raw times on load, insert and update.
    pub fn parser(&self) -> &TimeParser<C> {
        &self.parser
    }

    /// Builds a canonical snapshot from records read from the document store.
    pub fn load(&self, records: Vec<VitalSignRecord>) -> SeriesState {
        let mut taken = HashSet::new();
        let records = records
            .into_iter()
            .map(|record| self.prepare(record, &mut taken))
            .collect();
        SeriesState {
            records: sorted(records),
        }
    }

    pub fn insert(&self, state: &SeriesState, record: VitalSignRecord) -> SeriesState {
        self.insert_many(state, std::iter::once(record))
    }

    pub fn insert_many(
        &self,
        state: &SeriesState,
        records: impl IntoIterator<Item = VitalSignRecord>,
    ) -> SeriesState {
        let mut taken: HashSet<RecordId> =
            state.records.iter().map(|record| record.id.clone()).collect();
        let mut next = state.records.clone();
        let before = next.len();
        next.extend(
            records
                .into_iter()
                .map(|record| self.prepare(record, &mut taken)),
        );
        tracing::debug!(inserted = next.len() - before, total = next.len(), "records inserted");
        SeriesState {
            records: sorted(next),
        }
    }

    /// Changes only the fields present in `patch`. MAP is re-derived; the
    /// instant is recomputed only when a new raw time is supplied.
    ///
    /// The merged record is re-validated before anything is committed, so an
    /// edit that clears a required field or inverts the pressures against
    /// the stored values fails with [`VitalsError::Validation`].
    pub fn update(
        &self,
        state: &SeriesState,
        id: &RecordId,
        patch: VitalPatch,
    ) -> Result<SeriesState, VitalsError> {
        if patch.is_empty() {
            return Err(VitalsError::EmptyMutation);
        }
        let index = position(state, id)?;

        let mut next = state.records.clone();
        let record = &mut next[index];
        let touched: Vec<VitalField> = patch
            .fields
            .keys()
            .copied()
            .filter(|field| *field != VitalField::MeanArterialPressure)
            .collect();
        for (field, value) in patch.fields {
            if field == VitalField::MeanArterialPressure {
                continue;
            }
            record.vitals.set(field, value)?;
        }
        let report = validate_edit(&record.vitals, touched);
        if !report.valid {
            tracing::debug!(id = %id, errors = report.errors.len(), "update rejected");
            return Err(VitalsError::Validation(report));
        }
        record.vitals.derive_mean_arterial_pressure();

        if let Some(raw) = patch.timestamp {
            record.instant = self.parser.parse(&raw, self.reference);
            if record.instant.is_none() {
                tracing::debug!(id = %id, "updated time could not be placed");
            }
            record.timestamp = Some(raw);
        }

        tracing::debug!(id = %id, "record updated");
        Ok(SeriesState {
            records: sorted(next),
        })
    }

    pub fn delete(&self, state: &SeriesState, id: &RecordId) -> Result<SeriesState, VitalsError> {
        let index = position(state, id)?;
        let mut next = state.records.clone();
        next.remove(index);
        tracing::debug!(id = %id, remaining = next.len(), "record deleted");
        Ok(SeriesState { records: next })
    }

    /// Irreversibly drops every record.
    pub fn clear_all(&self, state: &SeriesState, _request: ClearAllRequest) -> SeriesState {
        tracing::debug!(cleared = state.len(), "series cleared");
        SeriesState::default()
    }

    fn prepare(&self, mut record: VitalSignRecord, taken: &mut HashSet<RecordId>) -> VitalSignRecord {
        if !record.id.is_assigned() {
            record.id = RecordId::generate();
        }
        if taken.contains(&record.id) {
            let original = record.id.clone();
            record.id = (2..)
                .map(|n| original.with_suffix(n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(RecordId::generate);
            tracing::debug!(original = %original, assigned = %record.id, "record id collision");
        }
        taken.insert(record.id.clone());

        record.instant = record
            .timestamp
            .as_ref()
            .and_then(|raw| self.parser.parse(raw, self.reference))
            .or(record.instant);
        record.vitals.derive_mean_arterial_pressure();
        record
    }
}

fn position(state: &SeriesState, id: &RecordId) -> Result<usize, VitalsError> {
    state
        .records
        .iter()
        .position(|record| &record.id == id)
        .ok_or_else(|| VitalsError::UnknownRecord(id.clone()))
}

/// Stable ascending sort; records without an instant go last.
fn sorted(mut records: Vec<VitalSignRecord>) -> Vec<VitalSignRecord> {
    records.sort_by(|a, b| compare_instants(a.instant, b.instant));
    records
}

fn compare_instants(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FieldValue, Vitals};
    use crate::time::{FixedClock, RawTimestamp};

    fn utc(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .expect("valid test instant")
            .with_timezone(&Utc)
    }

    fn store() -> SeriesStore<FixedClock> {
        SeriesStore::new(TimeParser::with_clock(FixedClock(utc("2024-01-01T12:00:00Z"))))
            .with_reference(utc("2024-01-01T08:00:00Z"))
    }

    fn raw_record(id: &str, time: &str) -> VitalSignRecord {
        VitalSignRecord {
            id: RecordId::new(id),
            timestamp: Some(RawTimestamp::Text(time.into())),
            instant: None,
            vitals: Vitals {
                heart_rate: Some(70.0),
                systolic: Some(120.0),
                diastolic: Some(80.0),
                ..Vitals::default()
            },
        }
    }

    fn ids(state: &SeriesState) -> Vec<&str> {
        state.iter().map(|record| record.id.as_str()).collect()
    }

    #[test]
    fn load_sorts_and_places_unparseable_last() {
        let state = store().load(vec![
            raw_record("late", "09:00"),
            raw_record("broken", "depois"),
            raw_record("early", "2024-01-01T08:05:00Z"),
        ]);
        assert_eq!(ids(&state), vec!["early", "late", "broken"]);
        assert_eq!(state.records()[1].instant, Some(utc("2024-01-01T09:00:00Z")));
        assert_eq!(state.records()[2].instant, None);
    }

    #[test]
    fn insert_assigns_ids_and_derives_map() {
        let store = store();
        let state = store.insert(&SeriesState::default(), raw_record("", "08:10"));
        let record = &state.records()[0];
        assert!(record.id.is_assigned());
        assert_eq!(record.vitals.mean_arterial_pressure, Some(93.0));
    }

    #[test]
    fn colliding_ids_get_suffixes() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let state = store.insert_many(
            &state,
            vec![raw_record("a", "08:10"), raw_record("a", "08:15")],
        );
        assert_eq!(ids(&state), vec!["a", "a-2", "a-3"]);
    }

    #[test]
    fn mutations_leave_previous_snapshot_untouched() {
        let store = store();
        let first = store.load(vec![raw_record("a", "08:05")]);
        let second = store.insert(&first, raw_record("b", "08:00"));
        assert_eq!(first.len(), 1);
        assert_eq!(ids(&second), vec!["b", "a"]);
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05"), raw_record("b", "08:10")]);
        let patch = VitalPatch::new()
            .set(VitalField::Diastolic, FieldValue::Number(60.0))
            .set(VitalField::Temperature, FieldValue::Number(36.4))
            .clear(VitalField::Bis);
        let state = store
            .update(&state, &RecordId::new("a"), patch)
            .expect("update");

        let record = state.get(&RecordId::new("a")).expect("record a");
        assert_eq!(record.vitals.heart_rate, Some(70.0));
        assert_eq!(record.vitals.temperature, Some(36.4));
        assert_eq!(record.vitals.bis, None);
        assert_eq!(record.vitals.systolic, Some(120.0));
        assert_eq!(record.vitals.mean_arterial_pressure, Some(80.0));
        assert_eq!(record.instant, Some(utc("2024-01-01T08:05:00Z")));
    }

    #[test]
    fn update_with_new_time_reorders() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05"), raw_record("b", "08:10")]);
        let patch = VitalPatch::new().timestamp(RawTimestamp::Text("08:20".into()));
        let state = store
            .update(&state, &RecordId::new("a"), patch)
            .expect("update");
        assert_eq!(ids(&state), vec!["b", "a"]);
    }

    #[test]
    fn lone_systolic_edit_is_checked_against_stored_diastolic() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let patch = VitalPatch::new().set(VitalField::Systolic, FieldValue::Number(70.0));
        let err = store
            .update(&state, &RecordId::new("a"), patch)
            .expect_err("systolic below stored diastolic");
        let VitalsError::Validation(report) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(
            report.error(VitalField::Systolic),
            Some("PAS deve ser maior que a PAD")
        );

        let record = state.get(&RecordId::new("a")).expect("record a");
        assert_eq!(record.vitals.systolic, Some(120.0));
        assert_eq!(record.vitals.mean_arterial_pressure, Some(93.0));
    }

    #[test]
    fn clearing_a_required_field_is_rejected() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let patch = VitalPatch::new().clear(VitalField::HeartRate);
        let err = store
            .update(&state, &RecordId::new("a"), patch)
            .expect_err("heart rate is required");
        let VitalsError::Validation(report) = err else {
            panic!("expected a validation error, got {err:?}");
        };
        assert_eq!(report.error(VitalField::HeartRate), Some("FC é obrigatório"));
    }

    #[test]
    fn out_of_range_edit_is_rejected() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let patch = VitalPatch::new().set(VitalField::HeartRate, FieldValue::Number(400.0));
        assert!(matches!(
            store.update(&state, &RecordId::new("a"), patch),
            Err(VitalsError::Validation(_))
        ));
    }

    #[test]
    fn empty_update_is_rejected() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let err = store
            .update(&state, &RecordId::new("a"), VitalPatch::new())
            .expect_err("empty patch");
        assert_eq!(err, VitalsError::EmptyMutation);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05")]);
        let err = store
            .delete(&state, &RecordId::new("zzz"))
            .expect_err("unknown id");
        assert_eq!(err, VitalsError::UnknownRecord(RecordId::new("zzz")));
    }

    #[test]
    fn delete_and_clear_all_are_distinct() {
        let store = store();
        let state = store.load(vec![raw_record("a", "08:05"), raw_record("b", "08:10")]);
        let after_delete = store.delete(&state, &RecordId::new("a")).expect("delete");
        assert_eq!(ids(&after_delete), vec!["b"]);

        let cleared = store.clear_all(&state, ClearAllRequest::confirmed());
        assert!(cleared.is_empty());
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn equal_instants_keep_insertion_order() {
        let store = store();
        let state = store.load(vec![
            raw_record("first", "08:05"),
            raw_record("second", "08:05"),
            raw_record("third", "08:05"),
        ]);
        assert_eq!(ids(&state), vec!["first", "second", "third"]);
        assert_eq!(store.load(state.clone().into_records()), state);
    }
}

//! Clinical validation of vital-sign entries.
//!
//! Forms arrive as loosely typed values (blank inputs, numbers, numeric
//! strings with decimal commas). Validation never fails with an error value:
//! it produces a [`ValidationReport`] mapping each offending field to a
//! message shown next to the input.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::record::{
    FieldValue, PupilState, Rhythm, VitalField, VitalPatch, VitalSignRecord, Vitals,
};
use crate::time::RawTimestamp;
use crate::VitalsError;

/// Fields that every record must carry.
pub const REQUIRED_FIELDS: [VitalField; 5] = [
    VitalField::Rhythm,
    VitalField::HeartRate,
    VitalField::Systolic,
    VitalField::Diastolic,
    VitalField::Spo2,
];

/// Inclusive physiological range of a numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeRule {
    pub field: VitalField,
    pub min: f64,
    pub max: f64,
}

impl RangeRule {
    const fn new(field: VitalField, min: f64, max: f64) -> Self {
        Self { field, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn for_field(field: VitalField) -> Option<RangeRule> {
        RANGE_RULES.iter().copied().find(|rule| rule.field == field)
    }
}

pub const RANGE_RULES: [RangeRule; 10] = [
    RangeRule::new(VitalField::HeartRate, 30.0, 200.0),
    RangeRule::new(VitalField::Systolic, 50.0, 250.0),
    RangeRule::new(VitalField::Diastolic, 30.0, 150.0),
    RangeRule::new(VitalField::Spo2, 70.0, 100.0),
    RangeRule::new(VitalField::Etco2, 15.0, 60.0),
    RangeRule::new(VitalField::Fio2, 21.0, 100.0),
    RangeRule::new(VitalField::Bis, 0.0, 100.0),
    RangeRule::new(VitalField::TrainOfFour, 0.0, 4.0),
    RangeRule::new(VitalField::Temperature, 32.0, 42.0),
    RangeRule::new(VitalField::CentralVenousPressure, 0.0, 25.0),
];

/// One form input as typed by the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldInput {
    Blank,
    Number(f64),
    Text(String),
}

impl FieldInput {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldInput::Blank,
            Value::Number(number) => number
                .as_f64()
                .map(FieldInput::Number)
                .unwrap_or(FieldInput::Blank),
            Value::String(text) => FieldInput::from_text(text),
            other => FieldInput::Text(other.to_string()),
        }
    }

    /// Blank for whitespace, number for numeric text (decimal comma allowed).
    pub fn from_text(text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            FieldInput::Blank
        } else if let Some(number) = parse_decimal(trimmed) {
            FieldInput::Number(number)
        } else {
            FieldInput::Text(trimmed.to_string())
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, FieldInput::Blank)
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            FieldInput::Number(number) if number.is_finite() => Some(*number),
            FieldInput::Text(text) => parse_decimal(text),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            FieldInput::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<f64> for FieldInput {
    fn from(value: f64) -> Self {
        FieldInput::Number(value)
    }
}

impl From<&str> for FieldInput {
    fn from(value: &str) -> Self {
        FieldInput::from_text(value)
    }
}

pub(crate) fn parse_decimal(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Raw contents of the vital-sign entry form.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VitalSignForm {
    pub fields: BTreeMap<VitalField, FieldInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,
}

impl VitalSignForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: VitalField, input: impl Into<FieldInput>) -> Self {
        self.fields.insert(field, input.into());
        self
    }

    pub fn blank(mut self, field: VitalField) -> Self {
        self.fields.insert(field, FieldInput::Blank);
        self
    }

    pub fn at(mut self, raw: impl Into<RawTimestamp>) -> Self {
        self.timestamp = Some(raw.into());
        self
    }

    /// Reads a JSON object keyed by document field names. Unknown keys are ignored.
    pub fn from_json(value: &Value) -> Result<Self, VitalsError> {
        let map = value
            .as_object()
            .ok_or_else(|| VitalsError::Parse("formulário deve ser um objeto JSON".into()))?;

        let mut form = VitalSignForm::new();
        for (key, input) in map {
            if key == "timestamp" {
                form.timestamp = RawTimestamp::from_json(input);
                continue;
            }
            match VitalField::from_key(key) {
                Some(field) => {
                    form.fields.insert(field, FieldInput::from_json(input));
                }
                None => tracing::trace!(key = key.as_str(), "ignoring unknown form key"),
            }
        }
        Ok(form)
    }

    /// Complete check for a new record: required fields must be present.
    pub fn validate(&self) -> ValidationReport {
        validate(self)
    }

    /// Builds a new record; the form must pass [`validate`].
    pub fn to_record(&self) -> Result<VitalSignRecord, VitalsError> {
        let report = validate(self);
        if !report.valid {
            return Err(VitalsError::Validation(report));
        }
        let mut vitals = Vitals::default();
        for (field, value) in self.converted_fields() {
            vitals.set(field, value)?;
        }
        vitals.derive_mean_arterial_pressure();
        Ok(VitalSignRecord {
            timestamp: self.timestamp.clone(),
            vitals,
            ..VitalSignRecord::default()
        })
    }

    /// Builds an update; only submitted fields are included and blank ones
    /// become explicit clears.
    pub fn to_patch(&self) -> Result<VitalPatch, VitalsError> {
        let report = validate_partial(self);
        if !report.valid {
            return Err(VitalsError::Validation(report));
        }
        Ok(VitalPatch {
            fields: self.converted_fields().collect(),
            timestamp: self.timestamp.clone(),
        })
    }

    fn converted_fields(&self) -> impl Iterator<Item = (VitalField, Option<FieldValue>)> + '_ {
        self.fields
            .iter()
            .filter(|(field, _)| **field != VitalField::MeanArterialPressure)
            .map(|(field, input)| (*field, convert(*field, input)))
    }
}

impl<'de> Deserialize<'de> for VitalSignForm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        VitalSignForm::from_json(&value).map_err(serde::de::Error::custom)
    }
}

fn convert(field: VitalField, input: &FieldInput) -> Option<FieldValue> {
    match field {
        VitalField::Rhythm => input.as_text().and_then(Rhythm::parse).map(FieldValue::Rhythm),
        VitalField::Pupils => input
            .as_text()
            .and_then(PupilState::parse)
            .map(FieldValue::Pupils),
        _ => input.as_number().map(FieldValue::Number),
    }
}

/// Outcome of validating a form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: BTreeMap<VitalField, String>,
}

impl ValidationReport {
    fn from_errors(errors: BTreeMap<VitalField, String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn error(&self, field: VitalField) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, message)| format!("{}: {message}", field.key()))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Validates a complete entry, including the required-field policy.
pub fn validate(form: &VitalSignForm) -> ValidationReport {
    check(form, true)
}

/// Validates only the submitted fields. Blank required fields are still
/// rejected, since submitting them would clear a required value.
pub fn validate_partial(form: &VitalSignForm) -> ValidationReport {
    check(form, false)
}

fn check(form: &VitalSignForm, require_all: bool) -> ValidationReport {
    let mut errors = BTreeMap::new();

    for field in REQUIRED_FIELDS {
        let missing = match form.fields.get(&field) {
            None => require_all,
            Some(input) => input.is_blank(),
        };
        if missing {
            errors.insert(field, format!("{} é obrigatório", field.label()));
        }
    }

    for (&field, input) in &form.fields {
        if input.is_blank() || errors.contains_key(&field) {
            continue;
        }
        if let Some(message) = check_field(field, input) {
            errors.insert(field, message);
        }
    }

    let systolic = form.fields.get(&VitalField::Systolic).and_then(FieldInput::as_number);
    let diastolic = form.fields.get(&VitalField::Diastolic).and_then(FieldInput::as_number);
    if let (Some(systolic), Some(diastolic)) = (systolic, diastolic) {
        if systolic <= diastolic && !errors.contains_key(&VitalField::Systolic) {
            errors.insert(
                VitalField::Systolic,
                "PAS deve ser maior que a PAD".to_string(),
            );
        }
    }

    ValidationReport::from_errors(errors)
}

fn check_field(field: VitalField, input: &FieldInput) -> Option<String> {
    match field {
        // Derived from the pressures; whatever was typed is discarded.
        VitalField::MeanArterialPressure => None,
        VitalField::Rhythm => match input.as_text().and_then(Rhythm::parse) {
            Some(_) => None,
            None => Some("Ritmo não reconhecido".to_string()),
        },
        VitalField::Pupils => match input.as_text().and_then(PupilState::parse) {
            Some(_) => None,
            None => Some("Estado pupilar não reconhecido".to_string()),
        },
        numeric => {
            let Some(value) = input.as_number() else {
                return Some(format!("{} deve ser numérico", numeric.label()));
            };
            match RangeRule::for_field(numeric) {
                Some(rule) if !rule.contains(value) => Some(format!(
                    "{} deve estar entre {} e {}",
                    numeric.label(),
                    format_bound(rule.min),
                    format_bound(rule.max)
                )),
                Some(_) => None,
                None if value < 0.0 => Some(format!("{} não pode ser negativo", numeric.label())),
                None => None,
            }
        }
    }
}

fn format_bound(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

/// Checks an already-built record against the required set and ranges.
pub fn validate_record(record: &VitalSignRecord) -> ValidationReport {
    validate(&form_from_vitals(&record.vitals, VitalField::ALL))
}

/// Re-checks a record after an edit touching `fields`.
///
/// Only the edited fields are range-checked and a cleared required field is
/// rejected. When either pressure was edited, the ordering rule is checked
/// against the merged pair, so a lone systolic edit cannot fall below the
/// stored diastolic.
pub fn validate_edit(
    vitals: &Vitals,
    fields: impl IntoIterator<Item = VitalField>,
) -> ValidationReport {
    let mut form = form_from_vitals(vitals, fields);
    let pressures = [VitalField::Systolic, VitalField::Diastolic];
    if pressures.iter().any(|field| form.fields.contains_key(field)) {
        for field in pressures {
            if let Some(value) = vitals.number(field) {
                form.fields.entry(field).or_insert(FieldInput::Number(value));
            }
        }
    }
    check(&form, false)
}

fn form_from_vitals(
    vitals: &Vitals,
    fields: impl IntoIterator<Item = VitalField>,
) -> VitalSignForm {
    let mut form = VitalSignForm::new();
    for field in fields {
        let input = match vitals.get(field) {
            Some(FieldValue::Number(number)) => FieldInput::Number(number),
            Some(FieldValue::Rhythm(rhythm)) => FieldInput::Text(rhythm.label().to_string()),
            Some(FieldValue::Pupils(state)) => FieldInput::Text(state.label().to_string()),
            None if REQUIRED_FIELDS.contains(&field) => FieldInput::Blank,
            None => continue,
        };
        form.fields.insert(field, input);
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_form() -> VitalSignForm {
        VitalSignForm::new()
            .with(VitalField::Rhythm, "Sinusal")
            .with(VitalField::HeartRate, 72.0)
            .with(VitalField::Systolic, 120.0)
            .with(VitalField::Diastolic, 80.0)
            .with(VitalField::Spo2, 98.0)
    }

    #[test]
    fn accepts_complete_form() {
        let report = complete_form().validate();
        assert!(report.valid, "{report}");
        assert!(report.errors.is_empty());
    }

    #[test]
    fn blank_heart_rate_and_inverted_pressures() {
        let form = VitalSignForm::from_json(&json!({
            "fc": "",
            "pasSistolica": 120,
            "pasDiastolica": 150,
            "spo2": 98,
            "ritmo": "Sinusal"
        }))
        .expect("form object");

        let report = validate(&form);
        assert!(!report.valid);
        assert_eq!(report.error(VitalField::HeartRate), Some("FC é obrigatório"));
        assert_eq!(
            report.error(VitalField::Systolic),
            Some("PAS deve ser maior que a PAD")
        );
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let at_bounds = complete_form()
            .with(VitalField::HeartRate, 30.0)
            .with(VitalField::Spo2, 100.0)
            .with(VitalField::Temperature, "42,0")
            .with(VitalField::TrainOfFour, 0.0);
        assert!(validate(&at_bounds).valid);

        let outside = complete_form()
            .with(VitalField::HeartRate, 201.0)
            .with(VitalField::Temperature, 31.9)
            .with(VitalField::Fio2, 20.0);
        let report = validate(&outside);
        assert_eq!(
            report.error(VitalField::HeartRate),
            Some("FC deve estar entre 30 e 200")
        );
        assert_eq!(
            report.error(VitalField::Temperature),
            Some("Temperatura deve estar entre 32 e 42")
        );
        assert_eq!(
            report.error(VitalField::Fio2),
            Some("FiO₂ deve estar entre 21 e 100")
        );
    }

    #[test]
    fn range_error_takes_precedence_over_pressure_order() {
        let form = complete_form()
            .with(VitalField::Systolic, 40.0)
            .with(VitalField::Diastolic, 60.0);
        let report = validate(&form);
        assert_eq!(
            report.error(VitalField::Systolic),
            Some("PAS deve estar entre 50 e 250")
        );
    }

    #[test]
    fn non_numeric_and_negative_inputs() {
        let form = complete_form()
            .with(VitalField::Lactate, "alto")
            .with(VitalField::BloodLoss, -5.0);
        let report = validate(&form);
        assert_eq!(
            report.error(VitalField::Lactate),
            Some("Lactato deve ser numérico")
        );
        assert_eq!(
            report.error(VitalField::BloodLoss),
            Some("Sangramento não pode ser negativo")
        );
    }

    #[test]
    fn unknown_rhythm_is_rejected() {
        let report = validate(&complete_form().with(VitalField::Rhythm, "Galope"));
        assert_eq!(report.error(VitalField::Rhythm), Some("Ritmo não reconhecido"));
    }

    #[test]
    fn typed_mean_arterial_pressure_is_ignored_and_rederived() {
        let record = complete_form()
            .with(VitalField::MeanArterialPressure, 999.0)
            .to_record()
            .expect("valid form");
        assert_eq!(record.vitals.mean_arterial_pressure, Some(93.0));
        assert!(!record.id.is_assigned());
    }

    #[test]
    fn partial_patch_keeps_explicit_clears() {
        let patch = VitalSignForm::new()
            .with(VitalField::HeartRate, 88.0)
            .blank(VitalField::Temperature)
            .to_patch()
            .expect("partial form");
        assert_eq!(
            patch.fields.get(&VitalField::HeartRate),
            Some(&Some(FieldValue::Number(88.0)))
        );
        assert_eq!(patch.fields.get(&VitalField::Temperature), Some(&None));
        assert!(!patch.fields.contains_key(&VitalField::Systolic));
    }

    #[test]
    fn partial_patch_cannot_clear_required_field() {
        let err = VitalSignForm::new()
            .blank(VitalField::Spo2)
            .to_patch()
            .expect_err("clearing SpO2");
        match err {
            VitalsError::Validation(report) => {
                assert_eq!(report.error(VitalField::Spo2), Some("SpO₂ é obrigatório"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_record_flags_missing_required_values() {
        let record = VitalSignRecord::default();
        let report = validate_record(&record);
        assert_eq!(report.errors.len(), REQUIRED_FIELDS.len());
    }

    #[test]
    fn form_reads_timestamp_and_ignores_unknown_keys() {
        let form: VitalSignForm = serde_json::from_value(json!({
            "timestamp": "10:30",
            "observacao": "sem intercorrências",
            "fc": "72"
        }))
        .expect("deserialize form");
        assert_eq!(form.timestamp, Some(RawTimestamp::Text("10:30".into())));
        assert_eq!(form.fields.len(), 1);
        assert_eq!(
            form.fields.get(&VitalField::HeartRate),
            Some(&FieldInput::Number(72.0))
        );
    }

    #[test]
    fn report_display_lists_field_keys() {
        let report = validate(&VitalSignForm::new().with(VitalField::Rhythm, "Sinusal"));
        let text = report.to_string();
        assert!(text.contains("fc: FC é obrigatório"));
        assert!(text.contains("spo2: SpO₂ é obrigatório"));
    }
}

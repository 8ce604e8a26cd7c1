//! Vital-sign record model as exchanged with the document store.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::time::RawTimestamp;
use crate::validation::parse_decimal;
use crate::{round_half_up, VitalsError};

/// Every charted parameter of a vital-sign record, in display order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VitalField {
    #[serde(rename = "ritmo")]
    Rhythm,
    #[serde(rename = "fc")]
    HeartRate,
    #[serde(rename = "pasSistolica")]
    Systolic,
    #[serde(rename = "pasDiastolica")]
    Diastolic,
    #[serde(rename = "pam")]
    MeanArterialPressure,
    #[serde(rename = "spo2")]
    Spo2,
    #[serde(rename = "etco2")]
    Etco2,
    #[serde(rename = "fio2")]
    Fio2,
    #[serde(rename = "peep")]
    Peep,
    #[serde(rename = "volumeCorrente")]
    TidalVolume,
    #[serde(rename = "bis")]
    Bis,
    #[serde(rename = "pupilas")]
    Pupils,
    #[serde(rename = "tof")]
    TrainOfFour,
    #[serde(rename = "pvc")]
    CentralVenousPressure,
    #[serde(rename = "debitoCardiaco")]
    CardiacOutput,
    #[serde(rename = "glicemia")]
    Glucose,
    #[serde(rename = "lactato")]
    Lactate,
    #[serde(rename = "temperatura")]
    Temperature,
    #[serde(rename = "diurese")]
    UrineOutput,
    #[serde(rename = "sangramento")]
    BloodLoss,
}

impl VitalField {
    pub const ALL: [VitalField; 20] = [
        VitalField::Rhythm,
        VitalField::HeartRate,
        VitalField::Systolic,
        VitalField::Diastolic,
        VitalField::MeanArterialPressure,
        VitalField::Spo2,
        VitalField::Etco2,
        VitalField::Fio2,
        VitalField::Peep,
        VitalField::TidalVolume,
        VitalField::Bis,
        VitalField::Pupils,
        VitalField::TrainOfFour,
        VitalField::CentralVenousPressure,
        VitalField::CardiacOutput,
        VitalField::Glucose,
        VitalField::Lactate,
        VitalField::Temperature,
        VitalField::UrineOutput,
        VitalField::BloodLoss,
    ];

    /// Key used in stored documents and form payloads.
    pub fn key(self) -> &'static str {
        match self {
            VitalField::Rhythm => "ritmo",
            VitalField::HeartRate => "fc",
            VitalField::Systolic => "pasSistolica",
            VitalField::Diastolic => "pasDiastolica",
            VitalField::MeanArterialPressure => "pam",
            VitalField::Spo2 => "spo2",
            VitalField::Etco2 => "etco2",
            VitalField::Fio2 => "fio2",
            VitalField::Peep => "peep",
            VitalField::TidalVolume => "volumeCorrente",
            VitalField::Bis => "bis",
            VitalField::Pupils => "pupilas",
            VitalField::TrainOfFour => "tof",
            VitalField::CentralVenousPressure => "pvc",
            VitalField::CardiacOutput => "debitoCardiaco",
            VitalField::Glucose => "glicemia",
            VitalField::Lactate => "lactato",
            VitalField::Temperature => "temperatura",
            VitalField::UrineOutput => "diurese",
            VitalField::BloodLoss => "sangramento",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.key() == key)
    }

    /// Short clinical label shown next to inputs and chart legends.
    pub fn label(self) -> &'static str {
        match self {
            VitalField::Rhythm => "Ritmo",
            VitalField::HeartRate => "FC",
            VitalField::Systolic => "PAS",
            VitalField::Diastolic => "PAD",
            VitalField::MeanArterialPressure => "PAM",
            VitalField::Spo2 => "SpO₂",
            VitalField::Etco2 => "EtCO₂",
            VitalField::Fio2 => "FiO₂",
            VitalField::Peep => "PEEP",
            VitalField::TidalVolume => "Volume corrente",
            VitalField::Bis => "BIS",
            VitalField::Pupils => "Pupilas",
            VitalField::TrainOfFour => "TOF",
            VitalField::CentralVenousPressure => "PVC",
            VitalField::CardiacOutput => "Débito cardíaco",
            VitalField::Glucose => "Glicemia",
            VitalField::Lactate => "Lactato",
            VitalField::Temperature => "Temperatura",
            VitalField::UrineOutput => "Diurese",
            VitalField::BloodLoss => "Sangramento",
        }
    }

    pub fn unit(self) -> Option<&'static str> {
        match self {
            VitalField::HeartRate => Some("bpm"),
            VitalField::Systolic
            | VitalField::Diastolic
            | VitalField::MeanArterialPressure
            | VitalField::CentralVenousPressure => Some("mmHg"),
            VitalField::Spo2 | VitalField::Fio2 => Some("%"),
            VitalField::Etco2 | VitalField::Peep => Some("mmHg"),
            VitalField::TidalVolume | VitalField::UrineOutput | VitalField::BloodLoss => Some("mL"),
            VitalField::CardiacOutput => Some("L/min"),
            VitalField::Glucose => Some("mg/dL"),
            VitalField::Lactate => Some("mmol/L"),
            VitalField::Temperature => Some("°C"),
            VitalField::Rhythm | VitalField::Pupils | VitalField::Bis | VitalField::TrainOfFour => {
                None
            }
        }
    }

    /// Whether the field carries a measured number (as opposed to a category).
    pub fn is_numeric(self) -> bool {
        !matches!(self, VitalField::Rhythm | VitalField::Pupils)
    }
}

impl fmt::Display for VitalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Cardiac rhythm as selected on the chart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum Rhythm {
    Sinus,
    SinusTachycardia,
    SinusBradycardia,
    AtrialFibrillation,
    AtrialFlutter,
    SupraventricularTachycardia,
    VentricularTachycardia,
    Junctional,
    Paced,
}

impl Rhythm {
    pub const ALL: [Rhythm; 9] = [
        Rhythm::Sinus,
        Rhythm::SinusTachycardia,
        Rhythm::SinusBradycardia,
        Rhythm::AtrialFibrillation,
        Rhythm::AtrialFlutter,
        Rhythm::SupraventricularTachycardia,
        Rhythm::VentricularTachycardia,
        Rhythm::Junctional,
        Rhythm::Paced,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Rhythm::Sinus => "Sinusal",
            Rhythm::SinusTachycardia => "Taquicardia sinusal",
            Rhythm::SinusBradycardia => "Bradicardia sinusal",
            Rhythm::AtrialFibrillation => "Fibrilação atrial",
            Rhythm::AtrialFlutter => "Flutter atrial",
            Rhythm::SupraventricularTachycardia => "Taquicardia supraventricular",
            Rhythm::VentricularTachycardia => "Taquicardia ventricular",
            Rhythm::Junctional => "Ritmo juncional",
            Rhythm::Paced => "Marcapasso",
        }
    }

    /// Matches a label ignoring case, accents and surrounding whitespace.
    pub fn parse(text: &str) -> Option<Self> {
        let needle = fold_accents(text.trim());
        Self::ALL
            .into_iter()
            .find(|rhythm| fold_accents(rhythm.label()) == needle)
    }
}

impl TryFrom<String> for Rhythm {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rhythm::parse(&value).ok_or_else(|| format!("ritmo desconhecido: {value}"))
    }
}

impl From<Rhythm> for String {
    fn from(value: Rhythm) -> Self {
        value.label().to_string()
    }
}

/// Pupil assessment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum PupilState {
    Isocoric,
    Anisocoric,
    Miotic,
    Mydriatic,
}

impl PupilState {
    pub const ALL: [PupilState; 4] = [
        PupilState::Isocoric,
        PupilState::Anisocoric,
        PupilState::Miotic,
        PupilState::Mydriatic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PupilState::Isocoric => "Isocóricas",
            PupilState::Anisocoric => "Anisocóricas",
            PupilState::Miotic => "Mióticas",
            PupilState::Mydriatic => "Midriáticas",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let needle = fold_accents(text.trim());
        Self::ALL
            .into_iter()
            .find(|state| fold_accents(state.label()) == needle)
    }
}

impl TryFrom<String> for PupilState {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PupilState::parse(&value).ok_or_else(|| format!("estado pupilar desconhecido: {value}"))
    }
}

impl From<PupilState> for String {
    fn from(value: PupilState) -> Self {
        value.label().to_string()
    }
}

/// Opaque record identity assigned by the series store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn is_assigned(&self) -> bool {
        !self.0.trim().is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derived id used when the original collides with an existing record.
    pub(crate) fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A single parameter value, typed by the field it belongs to.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Rhythm(Rhythm),
    Pupils(PupilState),
}

impl FieldValue {
    pub fn as_number(self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(value),
            _ => None,
        }
    }
}

/// Measured parameters of one observation. Absent values are `None`.
///
/// Stored documents are read leniently: a blank or unknown category and a
/// value that is not a number (or a numeric string) are read as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    #[serde(
        rename = "ritmo",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_rhythm"
    )]
    pub rhythm: Option<Rhythm>,
    #[serde(
        rename = "fc",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub heart_rate: Option<f64>,
    #[serde(
        rename = "pasSistolica",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub systolic: Option<f64>,
    #[serde(
        rename = "pasDiastolica",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub diastolic: Option<f64>,
    #[serde(
        rename = "pam",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub mean_arterial_pressure: Option<f64>,
    #[serde(
        rename = "spo2",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub spo2: Option<f64>,
    #[serde(
        rename = "etco2",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub etco2: Option<f64>,
    #[serde(
        rename = "fio2",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub fio2: Option<f64>,
    #[serde(
        rename = "peep",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub peep: Option<f64>,
    #[serde(
        rename = "volumeCorrente",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub tidal_volume: Option<f64>,
    #[serde(
        rename = "bis",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub bis: Option<f64>,
    #[serde(
        rename = "pupilas",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_pupils"
    )]
    pub pupils: Option<PupilState>,
    #[serde(
        rename = "tof",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub train_of_four: Option<f64>,
    #[serde(
        rename = "pvc",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub central_venous_pressure: Option<f64>,
    #[serde(
        rename = "debitoCardiaco",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub cardiac_output: Option<f64>,
    #[serde(
        rename = "glicemia",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub glucose: Option<f64>,
    #[serde(
        rename = "lactato",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub lactate: Option<f64>,
    #[serde(
        rename = "temperatura",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub temperature: Option<f64>,
    #[serde(
        rename = "diurese",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub urine_output: Option<f64>,
    #[serde(
        rename = "sangramento",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_number"
    )]
    pub blood_loss: Option<f64>,
}

impl Vitals {
    fn number_slot(&mut self, field: VitalField) -> Option<&mut Option<f64>> {
        let slot = match field {
            VitalField::HeartRate => &mut self.heart_rate,
            VitalField::Systolic => &mut self.systolic,
            VitalField::Diastolic => &mut self.diastolic,
            VitalField::MeanArterialPressure => &mut self.mean_arterial_pressure,
            VitalField::Spo2 => &mut self.spo2,
            VitalField::Etco2 => &mut self.etco2,
            VitalField::Fio2 => &mut self.fio2,
            VitalField::Peep => &mut self.peep,
            VitalField::TidalVolume => &mut self.tidal_volume,
            VitalField::Bis => &mut self.bis,
            VitalField::TrainOfFour => &mut self.train_of_four,
            VitalField::CentralVenousPressure => &mut self.central_venous_pressure,
            VitalField::CardiacOutput => &mut self.cardiac_output,
            VitalField::Glucose => &mut self.glucose,
            VitalField::Lactate => &mut self.lactate,
            VitalField::Temperature => &mut self.temperature,
            VitalField::UrineOutput => &mut self.urine_output,
            VitalField::BloodLoss => &mut self.blood_loss,
            VitalField::Rhythm | VitalField::Pupils => return None,
        };
        Some(slot)
    }

    pub fn number(&self, field: VitalField) -> Option<f64> {
        match field {
            VitalField::HeartRate => self.heart_rate,
            VitalField::Systolic => self.systolic,
            VitalField::Diastolic => self.diastolic,
            VitalField::MeanArterialPressure => self.mean_arterial_pressure,
            VitalField::Spo2 => self.spo2,
            VitalField::Etco2 => self.etco2,
            VitalField::Fio2 => self.fio2,
            VitalField::Peep => self.peep,
            VitalField::TidalVolume => self.tidal_volume,
            VitalField::Bis => self.bis,
            VitalField::TrainOfFour => self.train_of_four,
            VitalField::CentralVenousPressure => self.central_venous_pressure,
            VitalField::CardiacOutput => self.cardiac_output,
            VitalField::Glucose => self.glucose,
            VitalField::Lactate => self.lactate,
            VitalField::Temperature => self.temperature,
            VitalField::UrineOutput => self.urine_output,
            VitalField::BloodLoss => self.blood_loss,
            VitalField::Rhythm | VitalField::Pupils => None,
        }
    }

    pub fn get(&self, field: VitalField) -> Option<FieldValue> {
        match field {
            VitalField::Rhythm => self.rhythm.map(FieldValue::Rhythm),
            VitalField::Pupils => self.pupils.map(FieldValue::Pupils),
            numeric => self.number(numeric).map(FieldValue::Number),
        }
    }

    /// Writes or clears one field. `None` is an explicit clear.
    pub fn set(&mut self, field: VitalField, value: Option<FieldValue>) -> Result<(), VitalsError> {
        match (field, value) {
            (VitalField::Rhythm, None) => self.rhythm = None,
            (VitalField::Rhythm, Some(FieldValue::Rhythm(rhythm))) => self.rhythm = Some(rhythm),
            (VitalField::Pupils, None) => self.pupils = None,
            (VitalField::Pupils, Some(FieldValue::Pupils(state))) => self.pupils = Some(state),
            (field, value) => {
                let number = match value {
                    None => None,
                    Some(FieldValue::Number(number)) => Some(number),
                    Some(_) => return Err(VitalsError::FieldKind(field)),
                };
                let slot = self
                    .number_slot(field)
                    .ok_or(VitalsError::FieldKind(field))?;
                *slot = number;
            }
        }
        Ok(())
    }

    /// Recomputes MAP from the pressures; cleared when either is missing.
    pub fn derive_mean_arterial_pressure(&mut self) {
        self.mean_arterial_pressure = match (self.systolic, self.diastolic) {
            (Some(systolic), Some(diastolic)) => Some(mean_arterial_pressure(systolic, diastolic)),
            _ => None,
        };
    }

    /// Present numeric values keyed by field.
    pub fn numbers(&self) -> BTreeMap<VitalField, f64> {
        VitalField::ALL
            .into_iter()
            .filter_map(|field| self.number(field).map(|value| (field, value)))
            .collect()
    }
}

/// `round((systolic + 2 × diastolic) / 3)`.
pub fn mean_arterial_pressure(systolic: f64, diastolic: f64) -> f64 {
    round_half_up((systolic + 2.0 * diastolic) / 3.0)
}

/// One observation at an instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VitalSignRecord {
    #[serde(default)]
    pub id: RecordId,
    /// Time exactly as supplied by the author or the upstream document.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::time::deserialize_lenient"
    )]
    pub timestamp: Option<RawTimestamp>,
    /// Canonical instant resolved from `timestamp`; `None` when it cannot be placed.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub instant: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub vitals: Vitals,
}

impl VitalSignRecord {
    /// A record placed at a known instant, without identity yet.
    pub fn at(instant: DateTime<Utc>, vitals: Vitals) -> Self {
        Self {
            id: RecordId::default(),
            timestamp: Some(RawTimestamp::Native(instant)),
            instant: Some(instant),
            vitals,
        }
    }
}

/// A partial change to a record. Fields present with `None` are cleared.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct VitalPatch {
    pub fields: BTreeMap<VitalField, Option<FieldValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<RawTimestamp>,
}

impl VitalPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: VitalField, value: FieldValue) -> Self {
        self.fields.insert(field, Some(value));
        self
    }

    pub fn clear(mut self, field: VitalField) -> Self {
        self.fields.insert(field, None);
        self
    }

    pub fn timestamp(mut self, raw: RawTimestamp) -> Self {
        self.timestamp = Some(raw);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.timestamp.is_none()
    }
}

fn lenient_rhythm<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Rhythm>, D::Error> {
    lenient(deserializer, |value| value.as_str().and_then(Rhythm::parse))
}

fn lenient_pupils<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<PupilState>, D::Error> {
    lenient(deserializer, |value| value.as_str().and_then(PupilState::parse))
}

fn lenient_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    lenient(deserializer, |value| match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_decimal(text),
        _ => None,
    })
}

fn lenient<'de, D, T>(
    deserializer: D,
    read: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = read(&value);
    if parsed.is_none() && !value.is_null() {
        tracing::trace!(%value, "ignoring unreadable stored value");
    }
    Ok(parsed)
}

/// Lowercases and strips Portuguese diacritics.
pub(crate) fn fold_accents(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys_round_trip() {
        for field in VitalField::ALL {
            assert_eq!(VitalField::from_key(field.key()), Some(field));
        }
        assert_eq!(VitalField::from_key("hora"), None);
    }

    #[test]
    fn rhythm_matching_ignores_accents_and_case() {
        assert_eq!(Rhythm::parse("fibrilacao ATRIAL"), Some(Rhythm::AtrialFibrillation));
        assert_eq!(Rhythm::parse(" Sinusal "), Some(Rhythm::Sinus));
        assert_eq!(Rhythm::parse("galope"), None);
        assert_eq!(PupilState::parse("isocoricas"), Some(PupilState::Isocoric));
    }

    #[test]
    fn set_rejects_mismatched_kinds() {
        let mut vitals = Vitals::default();
        let err = vitals
            .set(VitalField::HeartRate, Some(FieldValue::Rhythm(Rhythm::Sinus)))
            .expect_err("kind mismatch");
        assert_eq!(err, VitalsError::FieldKind(VitalField::HeartRate));

        vitals
            .set(VitalField::HeartRate, Some(FieldValue::Number(64.0)))
            .expect("numeric field");
        assert_eq!(vitals.heart_rate, Some(64.0));

        vitals.set(VitalField::HeartRate, None).expect("clear");
        assert_eq!(vitals.heart_rate, None);
    }

    #[test]
    fn mean_arterial_pressure_follows_pressures() {
        let mut vitals = Vitals {
            systolic: Some(120.0),
            diastolic: Some(80.0),
            ..Vitals::default()
        };
        vitals.derive_mean_arterial_pressure();
        assert_eq!(vitals.mean_arterial_pressure, Some(93.0));

        vitals.diastolic = None;
        vitals.derive_mean_arterial_pressure();
        assert_eq!(vitals.mean_arterial_pressure, None);
    }

    #[test]
    fn stored_values_degrade_to_absent() {
        let record: VitalSignRecord = serde_json::from_value(serde_json::json!({
            "id": "r1",
            "timestamp": "08:05",
            "ritmo": "",
            "pupilas": "reagentes",
            "fc": "72",
            "temperatura": "36,5",
            "spo2": "n/d",
            "bis": null,
            "pasSistolica": 120
        }))
        .expect("lenient record");
        assert_eq!(record.vitals.rhythm, None);
        assert_eq!(record.vitals.pupils, None);
        assert_eq!(record.vitals.heart_rate, Some(72.0));
        assert_eq!(record.vitals.temperature, Some(36.5));
        assert_eq!(record.vitals.spo2, None);
        assert_eq!(record.vitals.bis, None);
        assert_eq!(record.vitals.systolic, Some(120.0));
    }

    #[test]
    fn record_serializes_with_document_keys() {
        let record = VitalSignRecord {
            id: RecordId::new("r1"),
            timestamp: Some(RawTimestamp::Text("10:30".into())),
            instant: None,
            vitals: Vitals {
                rhythm: Some(Rhythm::Sinus),
                heart_rate: Some(70.0),
                ..Vitals::default()
            },
        };
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(value["id"], "r1");
        assert_eq!(value["timestamp"], "10:30");
        assert_eq!(value["ritmo"], "Sinusal");
        assert_eq!(value["fc"], 70.0);
        assert!(value.get("pasSistolica").is_none());
        assert!(value.get("instant").is_none());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert!(a.is_assigned());
        assert_ne!(a, b);
        assert!(!RecordId::default().is_assigned());
    }
}

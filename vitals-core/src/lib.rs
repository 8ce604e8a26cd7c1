//! Core model for intra-operative vital-sign charting: records, timestamps,
//! episode anchoring, clinical validation and the ordered series store.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

pub mod anchor;
pub mod record;
pub mod series;
pub mod time;
pub mod validation;

pub use anchor::{
    cadence_step, last_instant, placed_instant, resolve_anchor, resolve_anchor_with_source,
    suggest_next_time, Anchor, AnchorSource,
};
pub use record::{
    mean_arterial_pressure, FieldValue, PupilState, RecordId, Rhythm, VitalField, VitalPatch,
    VitalSignRecord, Vitals,
};
pub use series::{ClearAllRequest, SeriesState, SeriesStore};
pub use time::{
    format_clock_time, format_instant, Clock, FixedClock, RawTimestamp, SystemClock, TextShape,
    TimeParser,
};
pub use validation::{
    validate, validate_edit, validate_partial, validate_record, FieldInput, RangeRule,
    ValidationReport, VitalSignForm, RANGE_RULES, REQUIRED_FIELDS,
};

/// Settings shared by every component that interprets wall-clock times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VitalsConfig {
    /// Offset (minutes east of UTC) used to pick the calendar day of `HH:MM`
    /// inputs and to read naive date strings.
    pub local_offset_minutes: i32,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            local_offset_minutes: 0,
        }
    }
}

impl VitalsConfig {
    /// Offset as a chrono value; out-of-range settings fall back to UTC.
    pub fn local_offset(&self) -> FixedOffset {
        match FixedOffset::east_opt(self.local_offset_minutes.saturating_mul(60)) {
            Some(offset) => offset,
            None => {
                tracing::warn!(
                    minutes = self.local_offset_minutes,
                    "local offset out of range, using UTC"
                );
                Utc.fix()
            }
        }
    }
}

/// The document-store shape of one clinical episode.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "time::deserialize_lenient"
    )]
    pub declared_start: Option<RawTimestamp>,
    #[serde(default)]
    pub records: Vec<VitalSignRecord>,
}

impl Episode {
    pub fn from_json_str(json: &str) -> Result<Self, VitalsError> {
        serde_json::from_str(json).map_err(|err| VitalsError::Parse(err.to_string()))
    }

    /// Reference instant for this episode under the anchor policy.
    pub fn anchor<C: Clock>(&self, parser: &TimeParser<C>) -> DateTime<Utc> {
        resolve_anchor(self.declared_start.as_ref(), &self.records, parser)
    }

    /// Replaces the records with a canonical snapshot returned by the store.
    pub fn with_state(self, state: SeriesState) -> Self {
        Self {
            declared_start: self.declared_start,
            records: state.into_records(),
        }
    }
}

/// Errors reported by the vital-sign core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VitalsError {
    #[error("Registro de sinais vitais inválido: {0}")]
    Validation(ValidationReport),
    #[error("Nenhum campo informado para atualização")]
    EmptyMutation,
    #[error("Registro não encontrado: {0}")]
    UnknownRecord(RecordId),
    #[error("Valor incompatível com o campo {0}")]
    FieldKind(VitalField),
    #[error("Não foi possível ler os dados: {0}")]
    Parse(String),
}

/// Rounds half-way values toward positive infinity, like a browser's `Math.round`.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

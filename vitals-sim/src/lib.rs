//! Synthetic vital-sign trajectories for demos and drills.
//!
//! Each simulated parameter follows an independent random walk that reverts
//! toward its baseline and softens its noise near the clinical bounds. Samples
//! are placed on the same 5-/10-minute cadence used for manual entry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vitals_core::{
    cadence_step, last_instant, round_half_up, PupilState, Rhythm, VitalField, VitalSignRecord,
    Vitals,
};

pub mod random;

pub use random::{gaussian, ChaChaSource, SequenceSource, UniformSource};

/// Share of the distance to baseline recovered at every step.
pub const INERTIA: f64 = 0.2;

/// Lower SpO₂ bound for simulated patients. Manual entries accept down to 70 %,
/// simulated ones are kept in the range of a stable patient.
pub const SIMULATED_SPO2_MIN: f64 = 95.0;

/// Walk tuning for one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkParams {
    pub field: VitalField,
    pub min: f64,
    pub max: f64,
    /// Distance from a bound under which noise is scaled down.
    pub margin: f64,
    pub sigma: f64,
    /// Decimal places kept in emitted values.
    pub decimals: u8,
}

impl WalkParams {
    const fn new(field: VitalField, min: f64, max: f64, margin: f64, sigma: f64) -> Self {
        Self {
            field,
            min,
            max,
            margin,
            sigma,
            decimals: 0,
        }
    }

    const fn decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    /// Noise multiplier: 1 away from the bounds, falling linearly to 0 at them.
    pub fn softening(&self, previous: f64) -> f64 {
        let to_min = (previous - self.min) / self.margin;
        let to_max = (self.max - previous) / self.margin;
        1f64.min(to_min).min(to_max).max(0.0)
    }

    fn round(&self, value: f64) -> f64 {
        let scale = 10f64.powi(i32::from(self.decimals));
        round_half_up(value * scale) / scale
    }

    pub fn for_field(field: VitalField) -> Option<&'static WalkParams> {
        WALK_PARAMS.iter().find(|params| params.field == field)
    }
}

/// Simulated parameters, in the order their noise is drawn.
pub const WALK_PARAMS: [WalkParams; 8] = [
    WalkParams::new(VitalField::HeartRate, 30.0, 200.0, 10.0, 2.0),
    WalkParams::new(VitalField::Systolic, 50.0, 250.0, 15.0, 3.0),
    WalkParams::new(VitalField::Diastolic, 30.0, 150.0, 10.0, 2.0),
    WalkParams::new(VitalField::Spo2, SIMULATED_SPO2_MIN, 100.0, 3.0, 3.0),
    WalkParams::new(VitalField::Etco2, 15.0, 60.0, 5.0, 2.0),
    WalkParams::new(VitalField::Bis, 0.0, 100.0, 10.0, 3.0),
    WalkParams::new(VitalField::Temperature, 32.0, 42.0, 1.0, 0.3).decimals(1),
    WalkParams::new(VitalField::TidalVolume, 200.0, 800.0, 50.0, 20.0),
];

/// Starting values for a simulation. Absent parameters are not simulated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Baseline {
    #[serde(rename = "fc", default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<f64>,
    #[serde(rename = "pasSistolica", default, skip_serializing_if = "Option::is_none")]
    pub systolic: Option<f64>,
    #[serde(rename = "pasDiastolica", default, skip_serializing_if = "Option::is_none")]
    pub diastolic: Option<f64>,
    #[serde(rename = "spo2", default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<f64>,
    #[serde(rename = "etco2", default, skip_serializing_if = "Option::is_none")]
    pub etco2: Option<f64>,
    #[serde(rename = "bis", default, skip_serializing_if = "Option::is_none")]
    pub bis: Option<f64>,
    #[serde(rename = "temperatura", default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "volumeCorrente", default, skip_serializing_if = "Option::is_none")]
    pub tidal_volume: Option<f64>,
    /// Copied unchanged into every record.
    #[serde(rename = "ritmo", default, skip_serializing_if = "Option::is_none")]
    pub rhythm: Option<Rhythm>,
    #[serde(rename = "pupilas", default, skip_serializing_if = "Option::is_none")]
    pub pupils: Option<PupilState>,
}

impl Baseline {
    pub fn value(&self, field: VitalField) -> Option<f64> {
        match field {
            VitalField::HeartRate => self.heart_rate,
            VitalField::Systolic => self.systolic,
            VitalField::Diastolic => self.diastolic,
            VitalField::Spo2 => self.spo2,
            VitalField::Etco2 => self.etco2,
            VitalField::Bis => self.bis,
            VitalField::Temperature => self.temperature,
            VitalField::TidalVolume => self.tidal_volume,
            _ => None,
        }
    }
}

/// Where the first simulated sample is placed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SimulationStart {
    /// First sample one cadence step after the anchor.
    #[default]
    FromAnchor,
    /// Continue after the latest existing record; falls back to the anchor.
    /// Existing records are expected to be loaded, so their instants are set.
    AfterLastRecord,
}

/// What to simulate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRequest {
    #[serde(default)]
    pub baseline: Baseline,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub start: SimulationStart,
}

impl SimulationRequest {
    pub fn new(baseline: Baseline, duration_minutes: i64) -> Self {
        Self {
            baseline,
            duration_minutes: Some(duration_minutes),
            start: SimulationStart::FromAnchor,
        }
    }

    pub fn start(mut self, start: SimulationStart) -> Self {
        self.start = start;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Upper bound on a single run, which keeps output size bounded.
    pub max_duration_minutes: i64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_duration_minutes: 480,
        }
    }
}

/// Rejected simulation input. Nothing is generated when one is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Duração da simulação não informada")]
    MissingDuration,
    #[error("Duração da simulação deve ser positiva (recebido {0} min)")]
    NonPositiveDuration(i64),
    #[error("Duração da simulação excede o máximo de {max} min (recebido {requested} min)")]
    DurationTooLong { requested: i64, max: i64 },
    #[error("Período da simulação fora do intervalo de datas suportado")]
    OutOfRange,
}

/// Bounded random-walk generator.
#[derive(Debug, Clone)]
pub struct TrajectorySimulator<S = ChaChaSource> {
    source: S,
    config: SimulationConfig,
}

impl TrajectorySimulator<ChaChaSource> {
    /// Simulator drawing from OS entropy.
    pub fn new() -> Self {
        Self::with_source(ChaChaSource::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_source(ChaChaSource::seeded(seed))
    }
}

impl Default for TrajectorySimulator<ChaChaSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: UniformSource> TrajectorySimulator<S> {
    pub fn with_source(source: S) -> Self {
        Self {
            source,
            config: SimulationConfig::default(),
        }
    }

    pub fn config(mut self, config: SimulationConfig) -> Self {
        self.config = config;
        self
    }

    /// Generates records after `anchor` for the requested duration.
    ///
    /// `existing` only matters for [`SimulationStart::AfterLastRecord`]. The
    /// returned records are ordered, carry native timestamps and have no id yet.
    pub fn simulate(
        &mut self,
        request: &SimulationRequest,
        anchor: DateTime<Utc>,
        existing: &[VitalSignRecord],
    ) -> Result<Vec<VitalSignRecord>, SimulationError> {
        let minutes = self.check_duration(request.duration_minutes)?;

        let start = match request.start {
            SimulationStart::FromAnchor => anchor,
            SimulationStart::AfterLastRecord => last_instant(existing).unwrap_or(anchor),
        };
        let end = start
            .checked_add_signed(Duration::minutes(minutes))
            .ok_or(SimulationError::OutOfRange)?;

        let mut walkers: Vec<(&WalkParams, f64, f64)> = WALK_PARAMS
            .iter()
            .filter_map(|params| {
                let baseline = request.baseline.value(params.field)?;
                Some((params, baseline, baseline))
            })
            .collect();

        let mut records = Vec::new();
        let mut cursor = start;
        loop {
            let sample = match cursor.checked_add_signed(cadence_step(cursor - anchor)) {
                Some(sample) if sample <= end => sample,
                _ => break,
            };

            let mut vitals = Vitals {
                rhythm: request.baseline.rhythm,
                pupils: request.baseline.pupils,
                ..Vitals::default()
            };
            for (params, baseline, previous) in walkers.iter_mut() {
                let next = self.step(params, *baseline, *previous);
                *previous = next;
                set_number(&mut vitals, params.field, next);
            }
            vitals.derive_mean_arterial_pressure();

            records.push(VitalSignRecord::at(sample, vitals));
            cursor = sample;
        }

        tracing::debug!(
            count = records.len(),
            minutes,
            parameters = walkers.len(),
            "simulated trajectory"
        );
        Ok(records)
    }

    fn check_duration(&self, requested: Option<i64>) -> Result<i64, SimulationError> {
        let minutes = requested.ok_or(SimulationError::MissingDuration)?;
        if minutes <= 0 {
            return Err(SimulationError::NonPositiveDuration(minutes));
        }
        if minutes > self.config.max_duration_minutes {
            return Err(SimulationError::DurationTooLong {
                requested: minutes,
                max: self.config.max_duration_minutes,
            });
        }
        Ok(minutes)
    }

    /// One walk step: mean reversion plus softened Gaussian noise, clamped and rounded.
    fn step(&mut self, params: &WalkParams, baseline: f64, previous: f64) -> f64 {
        let drift = (baseline - previous) * INERTIA;
        let noise = gaussian(&mut self.source) * params.sigma * params.softening(previous);
        params.round((previous + drift + noise).clamp(params.min, params.max))
    }
}

fn set_number(vitals: &mut Vitals, field: VitalField, value: f64) {
    let slot = match field {
        VitalField::HeartRate => &mut vitals.heart_rate,
        VitalField::Systolic => &mut vitals.systolic,
        VitalField::Diastolic => &mut vitals.diastolic,
        VitalField::Spo2 => &mut vitals.spo2,
        VitalField::Etco2 => &mut vitals.etco2,
        VitalField::Bis => &mut vitals.bis,
        VitalField::Temperature => &mut vitals.temperature,
        VitalField::TidalVolume => &mut vitals.tidal_volume,
        _ => return,
    };
    *slot = Some(value);
}

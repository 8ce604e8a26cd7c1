//! WASM <-> JavaScript bridge for the vital-sign core.
//!
//! Every exported function has a `*_json` twin working on `serde_json::Value`
//! so the bridge logic is testable off the browser.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serde_wasm_bindgen::{from_value, Serializer};
use vitals_chart::ChartConfig;
use vitals_core::{
    format_clock_time, format_instant, resolve_anchor_with_source, suggest_next_time,
    ClearAllRequest, Clock, Episode, RecordId, SeriesState, SeriesStore, TimeParser,
    VitalField, VitalSignForm, VitalSignRecord, VitalsConfig, VitalsError,
};
use vitals_sim::{SimulationConfig, SimulationRequest, TrajectorySimulator};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
struct JsVitalsConfig {
    #[serde(default)]
    local_offset_minutes: Option<i32>,
    #[serde(default)]
    max_duration_minutes: Option<i64>,
    #[serde(default)]
    y_headroom: Option<f64>,
    #[serde(default)]
    x_padding_minutes: Option<i64>,
    #[serde(default)]
    tick_minutes: Option<i64>,
    #[serde(default)]
    label_gaps: Option<BTreeMap<VitalField, i64>>,
    /// Pins the clock, for replays and tests.
    #[serde(default)]
    now: Option<DateTime<Utc>>,
    /// Makes simulations reproducible.
    #[serde(default)]
    seed: Option<u64>,
}

/// Settings for one bridge call, defaults overridden by whatever JS supplied.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    pub vitals: VitalsConfig,
    pub simulation: SimulationConfig,
    pub chart: ChartConfig,
    pub clock: BridgeClock,
    pub seed: Option<u64>,
}

impl From<JsVitalsConfig> for BridgeConfig {
    fn from(cfg: JsVitalsConfig) -> Self {
        let mut base = BridgeConfig::default();
        if let Some(minutes) = cfg.local_offset_minutes {
            base.vitals.local_offset_minutes = minutes;
        }
        if let Some(minutes) = cfg.max_duration_minutes {
            base.simulation.max_duration_minutes = minutes;
        }
        if let Some(headroom) = cfg.y_headroom {
            base.chart.y_headroom = headroom;
        }
        if let Some(padding) = cfg.x_padding_minutes {
            base.chart.x_padding_minutes = padding;
        }
        if let Some(tick) = cfg.tick_minutes {
            base.chart.tick_minutes = tick;
        }
        if let Some(gaps) = cfg.label_gaps {
            base.chart.label_gaps.extend(gaps);
        }
        if let Some(now) = cfg.now {
            base.clock = BridgeClock::Fixed(now);
        }
        base.seed = cfg.seed;
        base
    }
}

impl BridgeConfig {
    pub fn from_json(value: Option<&Value>) -> Result<Self, String> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => serde_json::from_value::<JsVitalsConfig>(value.clone())
                .map(Self::from)
                .map_err(|err| format!("Não foi possível ler a configuração: {err}")),
        }
    }

    fn parser(&self) -> TimeParser<BridgeClock> {
        TimeParser::from_config(&self.vitals, self.clock)
    }
}

/// Browser clock unless a fixed instant was configured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum BridgeClock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock for BridgeClock {
    fn now(&self) -> DateTime<Utc> {
        match self {
            BridgeClock::System => Utc::now(),
            BridgeClock::Fixed(instant) => *instant,
        }
    }
}

/// An episode opened for one call: anchor resolved, records in canonical order.
struct OpenEpisode {
    episode: Episode,
    anchor: DateTime<Utc>,
    store: SeriesStore<BridgeClock>,
    state: SeriesState,
}

impl OpenEpisode {
    fn open(value: &Value, cfg: &BridgeConfig) -> Result<Self, String> {
        let episode: Episode = serde_json::from_value(value.clone())
            .map_err(|err| format!("Não foi possível ler o episódio: {err}"))?;
        let parser = cfg.parser();
        let anchor = episode.anchor(&parser);
        let store = SeriesStore::new(parser).with_reference(anchor);
        let state = store.load(episode.records.clone());
        Ok(Self {
            episode,
            anchor,
            store,
            state,
        })
    }

    fn into_value(self, state: SeriesState) -> Result<Value, String> {
        to_json(&self.episode.with_state(state))
    }
}

/// Edit requested by the UI.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Mutation {
    /// Manual entry; validated like a new record.
    Insert { record: VitalSignForm },
    /// Batch import, e.g. a simulated trajectory.
    InsertMany { records: Vec<VitalSignRecord> },
    Update { id: RecordId, fields: VitalSignForm },
    Delete { id: RecordId },
    ClearAll {
        #[serde(default)]
        confirmed: bool,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlacedInstant {
    instant: String,
    clock_time: String,
}

impl PlacedInstant {
    fn new(instant: DateTime<Utc>, cfg: &BridgeConfig) -> Self {
        Self {
            instant: format_instant(instant),
            clock_time: format_clock_time(instant, cfg.vitals.local_offset()),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|err| format!("Não foi possível serializar o resultado: {err}"))
}

fn format_vitals_error(err: VitalsError) -> String {
    match err {
        VitalsError::Validation(report) => json!({
            "message": "Registro de sinais vitais inválido",
            "errors": report.errors,
        })
        .to_string(),
        other => other.to_string(),
    }
}

/// `{ instant, clockTime }` for any supported shape, `null` when it cannot be placed.
pub fn parse_timestamp_json(
    raw: &Value,
    reference: Option<&Value>,
    cfg: &BridgeConfig,
) -> Result<Value, String> {
    let parser = cfg.parser();
    let reference = reference.and_then(|value| parser.parse_json(value, None));
    match parser.parse_json(raw, reference) {
        Some(instant) => to_json(&PlacedInstant::new(instant, cfg)),
        None => Ok(Value::Null),
    }
}

/// Validation report for a form. `partial` checks an edit instead of a new record.
pub fn validate_vitals_json(form: &Value, partial: bool) -> Result<Value, String> {
    let form = VitalSignForm::from_json(form).map_err(format_vitals_error)?;
    let report = if partial {
        vitals_core::validate_partial(&form)
    } else {
        form.validate()
    };
    to_json(&report)
}

pub fn resolve_anchor_json(episode: &Value, cfg: &BridgeConfig) -> Result<Value, String> {
    let episode: Episode = serde_json::from_value(episode.clone())
        .map_err(|err| format!("Não foi possível ler o episódio: {err}"))?;
    let parser = cfg.parser();
    let anchor = resolve_anchor_with_source(episode.declared_start.as_ref(), &episode.records, &parser);
    let placed = PlacedInstant::new(anchor.instant, cfg);
    Ok(json!({
        "instant": placed.instant,
        "clockTime": placed.clock_time,
        "source": anchor.source,
    }))
}

pub fn suggest_next_time_json(episode: &Value, cfg: &BridgeConfig) -> Result<Value, String> {
    let open = OpenEpisode::open(episode, cfg)?;
    let next = suggest_next_time(open.anchor, open.state.records());
    to_json(&PlacedInstant::new(next, cfg))
}

/// Generated records for the episode; they are not inserted.
pub fn simulate_vitals_json(
    episode: &Value,
    request: &Value,
    cfg: &BridgeConfig,
) -> Result<Value, String> {
    let open = OpenEpisode::open(episode, cfg)?;
    let request: SimulationRequest = serde_json::from_value(request.clone())
        .map_err(|err| format!("Não foi possível ler a simulação: {err}"))?;

    let records = match cfg.seed {
        Some(seed) => TrajectorySimulator::seeded(seed)
            .config(cfg.simulation.clone())
            .simulate(&request, open.anchor, open.state.records()),
        None => TrajectorySimulator::new()
            .config(cfg.simulation.clone())
            .simulate(&request, open.anchor, open.state.records()),
    }
    .map_err(|err| err.to_string())?;
    to_json(&records)
}

/// Applies one edit and returns the episode with its new canonical records.
pub fn apply_mutation_json(
    episode: &Value,
    mutation: &Value,
    cfg: &BridgeConfig,
) -> Result<Value, String> {
    let open = OpenEpisode::open(episode, cfg)?;
    let mutation: Mutation = serde_json::from_value(mutation.clone())
        .map_err(|err| format!("Operação inválida: {err}"))?;

    let state = match mutation {
        Mutation::Insert { record } => {
            let record = record.to_record().map_err(format_vitals_error)?;
            open.store.insert(&open.state, record)
        }
        Mutation::InsertMany { records } => open.store.insert_many(&open.state, records),
        Mutation::Update { id, fields } => {
            let patch = fields.to_patch().map_err(format_vitals_error)?;
            open.store
                .update(&open.state, &id, patch)
                .map_err(format_vitals_error)?
        }
        Mutation::Delete { id } => open
            .store
            .delete(&open.state, &id)
            .map_err(format_vitals_error)?,
        Mutation::ClearAll { confirmed: true } => {
            open.store.clear_all(&open.state, ClearAllRequest::confirmed())
        }
        Mutation::ClearAll { confirmed: false } => {
            return Err("Exclusão de todos os registros exige confirmação".to_string())
        }
    };
    open.into_value(state)
}

pub fn project_chart_json(episode: &Value, cfg: &BridgeConfig) -> Result<Value, String> {
    let open = OpenEpisode::open(episode, cfg)?;
    to_json(&vitals_chart::project(open.state.records(), open.anchor, &cfg.chart))
}

fn read_value(value: JsValue, what: &str) -> Result<Value, JsValue> {
    from_value::<Value>(value)
        .map_err(|err| JsValue::from_str(&format!("Não foi possível ler {what}: {err}")))
}

fn read_config(config: Option<JsValue>) -> Result<BridgeConfig, JsValue> {
    match config {
        Some(js_cfg) => {
            let cfg: JsVitalsConfig = from_value(js_cfg).map_err(|err| {
                JsValue::from_str(&format!("Não foi possível ler a configuração: {err}"))
            })?;
            Ok(BridgeConfig::from(cfg))
        }
        None => Ok(BridgeConfig::default()),
    }
}

fn write_value(result: Result<Value, String>) -> Result<JsValue, JsValue> {
    let value = result.map_err(|err| JsValue::from_str(&err))?;
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|err| JsValue::from_str(&format!("Não foi possível serializar o resultado: {err}")))
}

fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

#[wasm_bindgen(js_name = parseTimestamp)]
pub fn parse_timestamp(
    raw: JsValue,
    reference: Option<JsValue>,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let raw = read_value(raw, "o horário")?;
    let reference = reference.map(|value| read_value(value, "a referência")).transpose()?;
    let cfg = read_config(config)?;
    write_value(parse_timestamp_json(&raw, reference.as_ref(), &cfg))
}

#[wasm_bindgen(js_name = validateVitals)]
pub fn validate_vitals(form: JsValue, partial: Option<bool>) -> Result<JsValue, JsValue> {
    init();
    let form = read_value(form, "o formulário")?;
    write_value(validate_vitals_json(&form, partial.unwrap_or(false)))
}

#[wasm_bindgen(js_name = resolveAnchor)]
pub fn resolve_anchor(episode: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    init();
    let episode = read_value(episode, "o episódio")?;
    let cfg = read_config(config)?;
    write_value(resolve_anchor_json(&episode, &cfg))
}

#[wasm_bindgen(js_name = suggestNextTime)]
pub fn suggest_next_time_js(episode: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    init();
    let episode = read_value(episode, "o episódio")?;
    let cfg = read_config(config)?;
    write_value(suggest_next_time_json(&episode, &cfg))
}

#[wasm_bindgen(js_name = simulateVitals)]
pub fn simulate_vitals(
    episode: JsValue,
    request: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let episode = read_value(episode, "o episódio")?;
    let request = read_value(request, "a simulação")?;
    let cfg = read_config(config)?;
    write_value(simulate_vitals_json(&episode, &request, &cfg))
}

#[wasm_bindgen(js_name = applyMutation)]
pub fn apply_mutation(
    episode: JsValue,
    mutation: JsValue,
    config: Option<JsValue>,
) -> Result<JsValue, JsValue> {
    init();
    let episode = read_value(episode, "o episódio")?;
    let mutation = read_value(mutation, "a operação")?;
    let cfg = read_config(config)?;
    write_value(apply_mutation_json(&episode, &mutation, &cfg))
}

#[wasm_bindgen(js_name = projectChart)]
pub fn project_chart(episode: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    init();
    let episode = read_value(episode, "o episódio")?;
    let cfg = read_config(config)?;
    write_value(project_chart_json(&episode, &cfg))
}

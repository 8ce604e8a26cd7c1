use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vitals_chart::{project, ChartConfig};
use vitals_core::{
    format_clock_time, format_instant, suggest_next_time, Episode, FixedClock, SeriesStore,
    TimeParser, VitalSignForm, VitalsConfig,
};
use vitals_sim::{
    Baseline, SimulationConfig, SimulationRequest, SimulationStart, TrajectorySimulator,
};

#[derive(Parser, Debug)]
#[command(
    name = "vitals-cli",
    about = "Ferramentas de linha de comando para sinais vitais intraoperatórios."
)]
struct Args {
    /// Arquivo JSON com as seções `vitals`, `simulation` e `chart`.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Fixa o relógio (RFC 3339); padrão: agora.
    #[arg(long, global = true)]
    now: Option<DateTime<Utc>>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interpreta um horário em qualquer formato aceito.
    ParseTime {
        /// Texto ou JSON (número, objeto `{seconds, nanoseconds}`).
        value: String,
        /// Dia de referência para entradas `HH:MM`.
        #[arg(long)]
        reference: Option<String>,
    },
    /// Valida um formulário de sinais vitais.
    Validate {
        #[arg(short, long)]
        input: PathBuf,
        /// Valida uma edição em vez de um registro novo.
        #[arg(long)]
        partial: bool,
    },
    /// Gera uma trajetória simulada para o episódio.
    Simulate(SimulateArgs),
    /// Projeta o episódio em coordenadas de gráfico.
    Chart {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Sugere o horário do próximo registro.
    SuggestNext {
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct SimulateArgs {
    /// Episódio de origem; sem ele a simulação parte do relógio.
    #[arg(short, long)]
    input: Option<PathBuf>,
    #[arg(short, long)]
    duration: i64,
    #[arg(long)]
    fc: Option<f64>,
    #[arg(long)]
    pas: Option<f64>,
    #[arg(long)]
    pad: Option<f64>,
    #[arg(long)]
    spo2: Option<f64>,
    #[arg(long)]
    etco2: Option<f64>,
    #[arg(long)]
    bis: Option<f64>,
    #[arg(long)]
    temperatura: Option<f64>,
    #[arg(long)]
    volume_corrente: Option<f64>,
    /// Continua após o último registro existente.
    #[arg(long)]
    after_last: bool,
    #[arg(long)]
    seed: Option<u64>,
    /// Devolve o episódio com os registros gerados incluídos.
    #[arg(long)]
    merge: bool,
}

impl SimulateArgs {
    fn baseline(&self) -> Baseline {
        Baseline {
            heart_rate: self.fc,
            systolic: self.pas,
            diastolic: self.pad,
            spo2: self.spo2,
            etco2: self.etco2,
            bis: self.bis,
            temperature: self.temperatura,
            tidal_volume: self.volume_corrente,
            ..Baseline::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct CliConfig {
    #[serde(default)]
    vitals: VitalsConfig,
    #[serde(default)]
    simulation: SimulationConfig,
    #[serde(default)]
    chart: ChartConfig,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Não foi possível ler a configuração {path:?}"))?;
    serde_json::from_str(&data).with_context(|| format!("Configuração inválida em {path:?}"))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Não foi possível ler o arquivo {path:?}"))?;
    serde_json::from_str(&data).with_context(|| format!("JSON inválido em {path:?}"))
}

fn read_episode(path: &Path) -> anyhow::Result<Episode> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Não foi possível ler o episódio {path:?}"))?;
    Ok(Episode::from_json_str(&data)?)
}

/// Accepts JSON literals, anything else is taken as text.
fn raw_json(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn print(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vitals_cli=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let clock = FixedClock(args.now.unwrap_or_else(Utc::now));
    let parser = TimeParser::from_config(&config.vitals, clock);

    match args.command {
        Command::ParseTime { value, reference } => {
            let reference = reference.and_then(|text| parser.parse_json(&raw_json(&text), None));
            match parser.parse_json(&raw_json(&value), reference) {
                Some(instant) => print(&serde_json::json!({
                    "instant": format_instant(instant),
                    "clockTime": format_clock_time(instant, parser.offset()),
                })),
                None => bail!("Horário não reconhecido: {value}"),
            }
        }
        Command::Validate { input, partial } => {
            let form = VitalSignForm::from_json(&read_json(&input)?)?;
            let report = if partial {
                vitals_core::validate_partial(&form)
            } else {
                form.validate()
            };
            if !report.valid {
                tracing::warn!(errors = report.errors.len(), "formulário inválido");
            }
            print(&report)
        }
        Command::Simulate(sim) => {
            let episode = match &sim.input {
                Some(path) => read_episode(path)?,
                None => Episode::default(),
            };
            let anchor = episode.anchor(&parser);
            let store = SeriesStore::new(parser).with_reference(anchor);
            let state = store.load(episode.records.clone());

            let start = if sim.after_last {
                SimulationStart::AfterLastRecord
            } else {
                SimulationStart::FromAnchor
            };
            let request = SimulationRequest::new(sim.baseline(), sim.duration).start(start);
            let records = match sim.seed {
                Some(seed) => TrajectorySimulator::seeded(seed)
                    .config(config.simulation)
                    .simulate(&request, anchor, state.records()),
                None => TrajectorySimulator::new()
                    .config(config.simulation)
                    .simulate(&request, anchor, state.records()),
            }?;
            tracing::info!(count = records.len(), anchor = %format_instant(anchor), "trajetória gerada");

            if sim.merge {
                let merged = store.insert_many(&state, records);
                print(&episode.with_state(merged))
            } else {
                print(&records)
            }
        }
        Command::Chart { input } => {
            let episode = read_episode(&input)?;
            let anchor = episode.anchor(&parser);
            let state = SeriesStore::new(parser)
                .with_reference(anchor)
                .load(episode.records);
            print(&project(state.records(), anchor, &config.chart))
        }
        Command::SuggestNext { input } => {
            let episode = read_episode(&input)?;
            let anchor = episode.anchor(&parser);
            let offset = parser.offset();
            let state = SeriesStore::new(parser)
                .with_reference(anchor)
                .load(episode.records);
            let next = suggest_next_time(anchor, state.records());
            print(&serde_json::json!({
                "anchor": format_instant(anchor),
                "instant": format_instant(next),
                "clockTime": format_clock_time(next, offset),
            }))
        }
    }
}

// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod config;
mod scenario;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Attribute, Cell, Color, Table, presets::UTF8_FULL};
use fluxion_heat_core::{
    CycleStatus, DEFAULT_SETTINGS_PATH, DecisionEngine, DeviceApi, EngineCollaborators,
    JsonFileSettingsStore, MemorySettingsStore, PriceProvider, Schedule, SettingsStore,
    WeatherProvider,
};
use fluxion_heat_types::{Decision, DecisionAction, HeatConfig, Telemetry, Zone};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use crate::scenario::{RecordedPrices, RecordedWeather, RecordingDevice, Scenario};

#[derive(Parser)]
#[command(name = "fluxion-heat")]
#[command(author, version, about = "FluxION price-aware heat pump optimizer")]
#[command(
    long_about = "Offline tools for the heating decision engine.\n\
    \nReplays recorded cycles, simulates a day of hourly decisions and shows\n\
    the upcoming schedule.\n\
    \nExamples:\n  \
    fluxion-heat decide --scenario demos/cheap_morning.json\n  \
    fluxion-heat simulate --scenario demos/cheap_morning.json --hours 24\n  \
    fluxion-heat next-runs --count 10"
)]
struct Cli {
    /// Configuration file (falls back to FLUXION_HEAT_CONFIG, then ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Settings file holding learned state
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one cycle against a recorded scenario and print the decisions
    Decide {
        /// Scenario JSON (telemetry, prices, optional weather)
        #[arg(long)]
        scenario: PathBuf,
    },

    /// Run hourly cycles over the scenario's price series
    Simulate {
        #[arg(long)]
        scenario: PathBuf,

        /// Number of hours to simulate (capped by the price series)
        #[arg(long, default_value_t = 24)]
        hours: usize,
    },

    /// Print the next scheduled cycles and calibrations
    NextRuns {
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Respects RUST_LOG
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Decide { scenario } => decide(config, &cli.settings, &scenario).await,
        Commands::Simulate { scenario, hours } => simulate(config, &scenario, hours).await,
        Commands::NextRuns { count } => next_runs(&config, count),
    }
}

// ============= Commands =============

struct Replay {
    engine: DecisionEngine,
    device: Arc<RecordingDevice>,
    prices: Arc<RecordedPrices>,
}

fn replay(config: HeatConfig, scenario: &Scenario, settings: Arc<dyn SettingsStore>) -> Result<Replay> {
    let device = Arc::new(RecordingDevice::new(scenario.telemetry.clone()));
    let prices = Arc::new(RecordedPrices::new(scenario.prices.clone()));
    let collaborators = EngineCollaborators {
        device: Arc::clone(&device) as Arc<dyn DeviceApi>,
        prices: Arc::clone(&prices) as Arc<dyn PriceProvider>,
        weather: scenario
            .weather
            .map(|w| Arc::new(RecordedWeather(w)) as Arc<dyn WeatherProvider>),
        settings,
    };
    let mut engine = DecisionEngine::new(config, collaborators)?;
    if let Some(occupied) = scenario.occupied {
        engine.set_occupancy(occupied)?;
    }
    Ok(Replay {
        engine,
        device,
        prices,
    })
}

async fn decide(config: HeatConfig, settings: &Path, scenario_path: &Path) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let store = Arc::new(JsonFileSettingsStore::open(settings));
    let Replay {
        mut engine, device, ..
    } = replay(config, &scenario, store)?;

    let before = scenario.telemetry.clone();
    let report = engine.run_cycle(scenario.decision_time()).await;
    engine.shutdown();

    let mut table = decision_table();
    for decision in &report.decisions {
        table.add_row(decision_row(None, decision, &before));
    }
    println!("{table}");

    if let Some(weather) = scenario.weather {
        let telemetry = device.telemetry();
        let eta = engine.thermal_model().calculate_time_to_target(
            before.indoor_temperature_c,
            telemetry.current_target_temperature_c,
            weather.outdoor_temperature_c,
            Some(&weather),
        );
        if eta.is_reachable() {
            println!(
                "{}: {:.1}°C reached in ~{:.0} min (confidence {:.0}%)",
                Zone::Primary,
                eta.predicted_temperature,
                eta.time_to_target_minutes,
                eta.confidence * 100.0
            );
        } else {
            println!("{}: target not reachable passively", Zone::Primary);
        }
    }

    match &report.status {
        CycleStatus::Completed => println!(
            "Cycle completed, {} device write(s)",
            device.write_count()
        ),
        CycleStatus::Failed { reason } => println!("Cycle failed: {reason}"),
    }

    let cop = engine.cop_range();
    println!(
        "COP range {:.2}-{:.2} from {} sample(s), latest {}",
        cop.min_observed,
        cop.max_observed,
        cop.history.len(),
        cop.history
            .back()
            .map_or_else(|| "-".to_owned(), |v| format!("{v:.2}"))
    );
    let breakers: Vec<String> = engine
        .breaker_states()
        .iter()
        .map(|(name, state)| format!("{name} {state}"))
        .collect();
    println!("Breakers: {}", breakers.join(", "));
    Ok(())
}

async fn simulate(config: HeatConfig, scenario_path: &Path, hours: usize) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    // Simulated timestamps must not leak into the real settings file
    let store = Arc::new(MemorySettingsStore::new());
    let Replay {
        mut engine,
        device,
        prices,
    } = replay(config, &scenario, store)?;

    let mut series = scenario.prices.prices.clone();
    series.sort_by_key(|s| s.time);
    let steps = hours.min(series.len());
    info!(steps, "Starting simulation");

    let mut table = decision_table();
    let mut failed = 0_usize;
    for sample in series.iter().take(steps) {
        prices.set_current(*sample);
        let before = device.telemetry();
        let report = engine.run_cycle(sample.time).await;
        if report.is_failed() {
            failed += 1;
        }
        for decision in &report.decisions {
            table.add_row(decision_row(Some(sample.time), decision, &before));
        }

        // Advance the rooms by one hour
        if let Some(weather) = scenario.weather {
            let after = device.telemetry();
            let mut heating = false;
            for reading in after.zone_readings() {
                let zone = reading.zone();
                if !zone.is_room() {
                    continue;
                }
                let measured = reading.measured_temperature_c();
                let target = reading.current_target_c();
                let active = target > measured;
                heating |= active;
                let next = engine.thermal_model().predict_temperature(
                    measured,
                    target,
                    weather.outdoor_temperature_c,
                    active,
                    Some(&weather),
                    60.0,
                );
                device.set_measured(zone, next);
            }
            device.set_heating_active(heating);
        }
    }
    engine.shutdown();

    println!("{table}");
    println!(
        "Simulated {steps} hour(s): {} device write(s), {failed} failed cycle(s)",
        device.write_count()
    );
    Ok(())
}

fn next_runs(config: &HeatConfig, count: usize) -> Result<()> {
    let schedule = Schedule::from_config(config)?;
    let tz = schedule.tz();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("When").add_attribute(Attribute::Bold),
        Cell::new("Job").add_attribute(Attribute::Bold),
    ]);
    for (when, job) in schedule.upcoming(Utc::now(), count) {
        table.add_row(vec![
            Cell::new(when.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z")),
            Cell::new(job.as_str()),
        ]);
    }
    println!("{table}");
    Ok(())
}

// ============= Output =============

fn decision_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Time").add_attribute(Attribute::Bold),
        Cell::new("Zone").add_attribute(Attribute::Bold),
        Cell::new("Measured\n(°C)").add_attribute(Attribute::Bold),
        Cell::new("Current\n(°C)").add_attribute(Attribute::Bold),
        Cell::new("Percentile").add_attribute(Attribute::Bold),
        Cell::new("Action").add_attribute(Attribute::Bold),
        Cell::new("Target\n(°C)").add_attribute(Attribute::Bold),
        Cell::new("Reason").add_attribute(Attribute::Bold),
    ]);
    table
}

fn decision_row(time: Option<DateTime<Utc>>, decision: &Decision, before: &Telemetry) -> Vec<Cell> {
    let reading = before.reading(decision.zone);
    let fmt_temp = |value: Option<f64>| value.map_or_else(|| "-".to_owned(), |v| format!("{v:.1}"));
    let action = match decision.action {
        DecisionAction::SetTarget => Cell::new("set").fg(Color::Green),
        DecisionAction::Hold => Cell::new("hold"),
    };

    vec![
        Cell::new(time.map_or_else(|| "now".to_owned(), |t| t.format("%H:%M").to_string())),
        Cell::new(decision.zone),
        Cell::new(fmt_temp(reading.map(|r| r.measured_temperature_c()))),
        Cell::new(fmt_temp(reading.map(|r| r.current_target_c()))),
        Cell::new(
            decision
                .percentile
                .map_or_else(|| "-".to_owned(), |p| format!("{:.0}%", p * 100.0)),
        ),
        action,
        Cell::new(fmt_temp(decision.to_temperature_c)),
        Cell::new(&decision.reason),
    ]
}

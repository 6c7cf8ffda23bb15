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

//! When the engine runs.
//!
//! Triggers compute their next fire time in the configured local timezone.
//! The [`CycleRunner`] serializes scheduled cycles, manual runs and weekly
//! calibrations on one engine.

use chrono::{
    DateTime, Datelike, Duration, NaiveDateTime, Offset, TimeZone, Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use fluxion_heat_types::{HeatConfig, ThermalCharacteristics};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{error, info, warn};

use crate::engine::{CycleReport, CycleStatus, DecisionEngine};
use crate::error::{HeatError, Result};

/// Recurring wake-up in local time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Every hour at `minute`
    Hourly { minute: u32 },
    /// Once a week
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

/// Resolve a local wall-clock time, moving past a DST gap
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
}

impl Trigger {
    /// First fire time strictly after `after`
    pub fn next_fire_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&tz).naive_local();
        match *self {
            Self::Hourly { minute } => {
                // Walk UTC hours so a repeated local hour fires twice
                let hour_start = after.date_naive().and_hms_opt(after.hour(), 0, 0)?.and_utc();
                (0..=3)
                    .filter_map(|h| {
                        let start = hour_start + Duration::hours(h);
                        let offset = start.with_timezone(&tz).offset().fix().local_minus_utc();
                        let shift = (i64::from(minute) * 60 - i64::from(offset)).rem_euclid(3600);
                        let fire = start + Duration::seconds(shift);
                        (fire.with_timezone(&tz).minute() == minute).then_some(fire)
                    })
                    .find(|t| *t > after)
            }
            Self::Weekly {
                weekday,
                hour,
                minute,
            } => (0..=7)
                .filter_map(|d| {
                    let date = local.date() + Duration::days(d);
                    if date.weekday() != weekday {
                        return None;
                    }
                    resolve_local(tz, date.and_hms_opt(hour, minute, 0)?)
                })
                .find(|t| *t > after),
        }
    }
}

/// Kind of scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Cycle,
    Calibration,
}

impl Job {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Calibration => "calibration",
        }
    }
}

/// Hourly cycle and weekly calibration triggers in one timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    cycle: Trigger,
    calibration: Trigger,
    tz: Tz,
}

impl Schedule {
    pub fn from_config(config: &HeatConfig) -> Result<Self> {
        let tz = config
            .tz()
            .map_err(|e| HeatError::Validation(format!("{e:#}")))?;
        let schedule = &config.schedule;
        Ok(Self {
            cycle: Trigger::Hourly {
                minute: schedule.cycle_minute,
            },
            calibration: Trigger::Weekly {
                weekday: schedule.calibration_weekday,
                hour: schedule.calibration_hour,
                minute: 0,
            },
            tz,
        })
    }

    pub fn cycle_trigger(&self) -> Trigger {
        self.cycle
    }

    pub fn calibration_trigger(&self) -> Trigger {
        self.calibration
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Next `count` scheduled jobs after `after`
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<(DateTime<Utc>, Job)> {
        let mut runs = Vec::with_capacity(count);
        let mut cursor = after;
        while runs.len() < count {
            let Some((when, job)) = self.next_job(cursor) else {
                break;
            };
            runs.push((when, job));
            cursor = when;
        }
        runs
    }

    /// Earliest job after `after`; calibration wins a tie
    pub fn next_job(&self, after: DateTime<Utc>) -> Option<(DateTime<Utc>, Job)> {
        let cycle = self.cycle.next_fire_after(after, self.tz);
        let calibration = self.calibration.next_fire_after(after, self.tz);
        match (cycle, calibration) {
            (Some(c), Some(k)) if k <= c => Some((k, Job::Calibration)),
            (Some(c), _) => Some((c, Job::Cycle)),
            (None, Some(k)) => Some((k, Job::Calibration)),
            (None, None) => None,
        }
    }
}

/// Owns the engine and runs it on schedule or on demand
#[derive(Debug)]
pub struct CycleRunner {
    engine: Arc<Mutex<DecisionEngine>>,
    manual_slots: Arc<Semaphore>,
    max_manual_jobs: usize,
    schedule: Schedule,
}

impl CycleRunner {
    pub fn new(engine: DecisionEngine) -> Result<Self> {
        let schedule = Schedule::from_config(engine.config())?;
        let max_manual_jobs = engine.config().schedule.max_concurrent_manual_jobs;

        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            manual_slots: Arc::new(Semaphore::new(max_manual_jobs)),
            max_manual_jobs,
            schedule,
        })
    }

    pub fn engine(&self) -> Arc<Mutex<DecisionEngine>> {
        Arc::clone(&self.engine)
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Run a cycle requested by a user, rejecting it when too many are pending
    pub async fn run_manual(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let Ok(_permit) = self.manual_slots.try_acquire() else {
            let active = self.max_manual_jobs - self.manual_slots.available_permits();
            warn!(active, max = self.max_manual_jobs, "Manual run rejected");
            return Err(HeatError::ManualJobRejected {
                active,
                max: self.max_manual_jobs,
            });
        };
        info!("Manual cycle requested");
        let mut engine = self.engine.lock().await;
        Ok(engine.run_cycle(now).await)
    }

    pub async fn run_scheduled(&self, now: DateTime<Utc>) -> CycleReport {
        let mut engine = self.engine.lock().await;
        engine.run_cycle(now).await
    }

    pub async fn calibrate(&self) -> ThermalCharacteristics {
        let mut engine = self.engine.lock().await;
        engine.calibrate()
    }

    /// Run until `shutdown` is notified, then stop the engine's timers
    pub async fn run(&self, shutdown: Arc<Notify>) {
        let tz = self.schedule.tz();
        info!(timezone = %tz, "Scheduler started");
        loop {
            let now = Utc::now();
            let Some((when, job)) = self.schedule.next_job(now) else {
                error!("No upcoming trigger, scheduler stopping");
                break;
            };
            let wait = (when - now).to_std().unwrap_or_default();
            info!(next = %when.with_timezone(&tz), job = job.as_str(), "Waiting for next run");

            tokio::select! {
                () = shutdown.notified() => {
                    info!("Shutdown requested, scheduler stopping");
                    break;
                }
                () = tokio::time::sleep(wait) => {
                    match job {
                        Job::Cycle => {
                            let report = self.run_scheduled(Utc::now()).await;
                            if let CycleStatus::Failed { reason } = &report.status {
                                warn!("Scheduled cycle failed: {reason}");
                            }
                        }
                        Job::Calibration => {
                            let characteristics = self.calibrate().await;
                            info!(
                                confidence = characteristics.model_confidence,
                                "Weekly calibration finished"
                            );
                        }
                    }
                }
            }
        }
        self.engine.lock().await.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Prague;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_hourly_trigger_fires_at_minute() {
        let trigger = Trigger::Hourly { minute: 5 };
        // 10:07 Prague (CET, UTC+1)
        let next = trigger.next_fire_after(utc("2025-01-15T09:07:00Z"), Prague).unwrap();
        assert_eq!(next, utc("2025-01-15T10:05:00Z"));

        let next = trigger.next_fire_after(utc("2025-01-15T09:03:00Z"), Prague).unwrap();
        assert_eq!(next, utc("2025-01-15T09:05:00Z"));
    }

    #[test]
    fn test_hourly_trigger_is_strictly_after() {
        let trigger = Trigger::Hourly { minute: 5 };
        let at = utc("2025-01-15T09:05:00Z");
        assert_eq!(
            trigger.next_fire_after(at, Prague).unwrap(),
            utc("2025-01-15T10:05:00Z")
        );
    }

    #[test]
    fn test_weekly_trigger() {
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            hour: 2,
            minute: 0,
        };
        // Wednesday 2025-01-15 -> Sunday 2025-01-19 02:00 CET
        let next = trigger.next_fire_after(utc("2025-01-15T12:00:00Z"), Prague).unwrap();
        assert_eq!(next, utc("2025-01-19T01:00:00Z"));
    }

    #[test]
    fn test_upcoming_interleaves_calibration() {
        let schedule = Schedule::from_config(&HeatConfig::default()).unwrap();
        // Sunday 2025-01-19 00:30 CET
        let runs = schedule.upcoming(utc("2025-01-18T23:30:00Z"), 4);
        let jobs: Vec<Job> = runs.iter().map(|(_, job)| *job).collect();
        assert_eq!(
            jobs,
            vec![Job::Cycle, Job::Calibration, Job::Cycle, Job::Cycle]
        );
        assert_eq!(runs[0].0, utc("2025-01-19T00:05:00Z"));
        assert_eq!(runs[1].0, utc("2025-01-19T01:00:00Z"));
        assert_eq!(runs[2].0, utc("2025-01-19T01:05:00Z"));
    }

    #[test]
    fn test_unknown_timezone_is_rejected() {
        let config = HeatConfig {
            timezone: "Mars/Olympus_Mons".to_owned(),
            ..HeatConfig::default()
        };
        assert!(matches!(
            Schedule::from_config(&config),
            Err(HeatError::Validation(_))
        ));
    }

    #[test]
    fn test_hourly_trigger_fires_twice_in_repeated_hour() {
        let trigger = Trigger::Hourly { minute: 5 };
        // 2025-10-26 02:05 happens in CEST (00:05 UTC) and again in CET (01:05 UTC)
        let first = trigger.next_fire_after(utc("2025-10-25T23:30:00Z"), Prague).unwrap();
        assert_eq!(first, utc("2025-10-26T00:05:00Z"));
        let second = trigger.next_fire_after(first, Prague).unwrap();
        assert_eq!(second, utc("2025-10-26T01:05:00Z"));
        let third = trigger.next_fire_after(second, Prague).unwrap();
        assert_eq!(third, utc("2025-10-26T02:05:00Z"));
    }

    #[test]
    fn test_hourly_trigger_across_spring_gap() {
        let trigger = Trigger::Hourly { minute: 5 };
        // 2025-03-30 01:05 CET is 00:05 UTC, next is 03:05 CEST at 01:05 UTC
        let next = trigger.next_fire_after(utc("2025-03-30T00:05:00Z"), Prague).unwrap();
        assert_eq!(next, utc("2025-03-30T01:05:00Z"));
    }

    #[test]
    fn test_hourly_trigger_half_hour_offset() {
        let trigger = Trigger::Hourly { minute: 5 };
        // Kolkata is UTC+5:30, local :05 is :35 UTC
        let next = trigger
            .next_fire_after(utc("2025-01-15T09:00:00Z"), chrono_tz::Asia::Kolkata)
            .unwrap();
        assert_eq!(next, utc("2025-01-15T09:35:00Z"));
    }

    #[test]
    fn test_weekly_trigger_skips_dst_gap() {
        let trigger = Trigger::Weekly {
            weekday: Weekday::Sun,
            hour: 2,
            minute: 0,
        };
        // 2025-03-30 02:00 does not exist in Prague; fires at 03:00 CEST instead
        let next = trigger.next_fire_after(utc("2025-03-28T12:00:00Z"), Prague).unwrap();
        assert_eq!(next, utc("2025-03-30T01:00:00Z"));
    }
}

mod queue;
mod slots;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeDelta, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tokio::time::{interval, MissedTickBehavior};

use crate::batch::BatchVerifier;
use crate::config::{Config, RetryPolicy};
use crate::logging::Logger;
use crate::monitor::{StationMonitor, StatusReport};
use crate::recorder::{RecordingInvoker, RecordingJob};
use crate::recording_log::{RecordingLog, RecordingLogEntry};
use crate::resolver::StreamUrlResolver;
use crate::stations::{Catalog, CatalogEntry, StationMap};

pub use queue::{JobKind, JobQueue, QueuedJob};
pub use slots::{
    fixed_interval_slots, minute_of_day, next_occurrence, randomized_window, window_slots,
    ScheduleEntry,
};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub output_dir: PathBuf,
    pub recording_duration: Duration,
    pub max_workers: usize,
    pub retry_policy: RetryPolicy,
    pub status_report_interval: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.recording.output_dir.clone(),
            recording_duration: Duration::from_secs(config.recording.seconds),
            max_workers: config.verification.max_workers,
            retry_policy: config.schedule.retry_policy,
            status_report_interval: Duration::from_secs(
                config.schedule.status_report_interval_seconds,
            ),
        }
    }
}

/// Collaborators handed to the scheduler at construction.
pub struct SchedulerDeps {
    pub catalog: Arc<Catalog>,
    pub resolver: StreamUrlResolver,
    pub verifier: BatchVerifier,
    pub recorder: Arc<dyn RecordingInvoker>,
    pub log: RecordingLog,
    pub monitor: StationMonitor,
    pub logger: Logger,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CityRunSummary {
    pub recorded: usize,
    pub failed: usize,
    pub unavailable: usize,
    #[serde(rename = "retriesScheduled")]
    pub retries_scheduled: usize,
}

/// Owns the station monitor and the delayed-job queue. Every mutation of
/// either happens on the task that drives `tick`, one job at a time.
pub struct RecordingScheduler {
    catalog: Arc<Catalog>,
    resolver: StreamUrlResolver,
    verifier: BatchVerifier,
    recorder: Arc<dyn RecordingInvoker>,
    log: RecordingLog,
    monitor: StationMonitor,
    queue: JobQueue,
    settings: SchedulerSettings,
    logger: Logger,
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(365))
}

impl RecordingScheduler {
    pub fn new(deps: SchedulerDeps, settings: SchedulerSettings) -> Self {
        Self {
            catalog: deps.catalog,
            resolver: deps.resolver,
            verifier: deps.verifier,
            recorder: deps.recorder,
            log: deps.log,
            monitor: deps.monitor,
            queue: JobQueue::new(),
            settings,
            logger: deps.logger,
        }
    }

    pub fn monitor(&self) -> &StationMonitor {
        &self.monitor
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Full verification pass over the catalog. Every station ends up either
    /// Working or Failed in the monitor.
    pub async fn verify_all_stations(&mut self) -> StatusReport {
        let all = self.catalog.all_stations();
        let working = self.resolve_and_verify(&all).await;
        for id in all.keys() {
            if working.contains_key(id) {
                self.monitor.mark_working(id);
            } else {
                self.monitor.mark_failed(id);
            }
        }
        let report = self.monitor.status_report();
        self.log_status(&report);
        report
    }

    /// Resolves catalog URLs and probes the results. The returned map is
    /// keyed by station id and holds resolved stream URLs.
    async fn resolve_and_verify(&self, stations: &StationMap) -> StationMap {
        let entries: Vec<CatalogEntry> = stations
            .iter()
            .map(|(id, url)| CatalogEntry::new(id.clone(), url.clone()))
            .collect();
        let resolution = self
            .resolver
            .resolve_all(entries, self.settings.max_workers)
            .await;
        let resolved: StationMap = resolution
            .resolved
            .into_iter()
            .map(|resolved| (resolved.id, resolved.url))
            .collect();
        self.verifier
            .verify_all(&resolved, self.settings.max_workers)
            .await
    }

    fn entry_for(&self, city: &str, time_of_day: chrono::NaiveTime) -> ScheduleEntry {
        ScheduleEntry {
            city: city.to_string(),
            time_of_day,
            station_ids: self.catalog.stations_for_city(city).into_keys().collect(),
        }
    }

    /// Gives each city one random daily slot inside the window and enqueues
    /// the slots.
    pub fn schedule_randomized<R: Rng + ?Sized>(
        &mut self,
        now: NaiveDateTime,
        start_hour: u32,
        end_hour: u32,
        interval_minutes: u32,
        rng: &mut R,
    ) -> Vec<ScheduleEntry> {
        let cities = self.catalog.cities();
        if cities.is_empty() {
            self.logger.error("scheduler.no_cities", json!({}));
            return Vec::new();
        }
        let total_minutes = end_hour.saturating_sub(start_hour) * 60;
        if (total_minutes / interval_minutes.max(1)) < cities.len() as u32 {
            self.logger.warn(
                "scheduler.window_too_small",
                json!({
                    "slots": total_minutes / interval_minutes.max(1),
                    "cities": cities.len(),
                }),
            );
        }

        let plan = randomized_window(&cities, start_hour, end_hour, interval_minutes, rng);
        let entries: Vec<ScheduleEntry> = plan
            .into_iter()
            .map(|(city, time_of_day)| self.entry_for(&city, time_of_day))
            .collect();
        for entry in &entries {
            self.enqueue_slot(now, entry);
        }
        entries
    }

    /// Records every city at each of the day's fixed slots.
    pub fn schedule_fixed(&mut self, now: NaiveDateTime, every_hours: u32) -> Vec<ScheduleEntry> {
        let cities = self.catalog.cities();
        let mut entries = Vec::new();
        for time_of_day in fixed_interval_slots(every_hours) {
            for city in &cities {
                let entry = self.entry_for(city, time_of_day);
                self.enqueue_slot(now, &entry);
                entries.push(entry);
            }
        }
        self.logger.info(
            "scheduler.fixed_planned",
            json!({ "cities": cities.len(), "everyHours": every_hours, "jobs": entries.len() }),
        );
        entries
    }

    /// Records every city every `minutes` minutes, first run one period from now.
    pub fn schedule_repeating(&mut self, now: NaiveDateTime, minutes: u32) {
        let every = TimeDelta::minutes(i64::from(minutes.max(1)));
        for city in self.catalog.cities() {
            self.queue.push(now + every, JobKind::Repeat { city, every });
        }
    }

    pub fn schedule_status_reports(&mut self, now: NaiveDateTime) {
        let every = to_delta(self.settings.status_report_interval);
        self.queue.push(now + every, JobKind::StatusReport { every });
    }

    fn enqueue_slot(&mut self, now: NaiveDateTime, entry: &ScheduleEntry) {
        let fire_at = next_occurrence(now, entry.time_of_day);
        self.queue.push(
            fire_at,
            JobKind::Slot {
                city: entry.city.clone(),
                time_of_day: entry.time_of_day,
            },
        );
        self.logger.info(
            "scheduler.slot_scheduled",
            json!({ "city": entry.city, "time": entry.time_label(), "firesAt": fire_at.to_string() }),
        );
    }

    /// Runs every job due at `now`. Jobs enqueued while running wait for a
    /// later tick. Returns the number of jobs fired.
    pub async fn tick(&mut self, now: NaiveDateTime) -> usize {
        let due = self.queue.drain_due(now);
        let fired = due.len();
        for job in due {
            match job.kind {
                JobKind::Slot { city, time_of_day } => {
                    self.record_city(&city, now).await;
                    self.queue.push(
                        next_occurrence(now, time_of_day),
                        JobKind::Slot { city, time_of_day },
                    );
                }
                JobKind::Repeat { city, every } => {
                    self.record_city(&city, now).await;
                    self.queue.push(now + every, JobKind::Repeat { city, every });
                }
                JobKind::Retry { id, raw_url, city } => {
                    self.retry_recording(&id, &raw_url, &city, now).await;
                }
                JobKind::StatusReport { every } => {
                    let report = self.monitor.status_report();
                    self.log_status(&report);
                    self.queue.push(now + every, JobKind::StatusReport { every });
                }
            }
        }
        fired
    }

    /// Drives `tick` once per second until ctrl-c.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        self.logger.info(
            "scheduler.started",
            json!({ "pendingJobs": self.queue.len() }),
        );
        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    self.logger.info("scheduler.shutdown", json!({ "pendingJobs": self.queue.len() }));
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick(Local::now().naive_local()).await;
                }
            }
        }
    }

    /// Resolves, verifies and records every station of a city, one after the
    /// other. Failed recordings feed the monitor and may enqueue a retry.
    pub async fn record_city(&mut self, city: &str, now: NaiveDateTime) -> CityRunSummary {
        let stations = self.catalog.stations_for_city(city);
        self.record_group(city, stations, now).await
    }

    /// Same as `record_city` for every station of one country. Files and log
    /// rows are labelled with the uppercase country code.
    pub async fn record_country(&mut self, code: &str, now: NaiveDateTime) -> CityRunSummary {
        let stations = self.catalog.stations_for_country(code);
        self.record_group(&code.trim().to_ascii_uppercase(), stations, now)
            .await
    }

    async fn record_group(
        &mut self,
        label: &str,
        stations: StationMap,
        now: NaiveDateTime,
    ) -> CityRunSummary {
        let mut summary = CityRunSummary::default();
        self.logger
            .info("record.city.started", json!({ "city": label }));

        if stations.is_empty() {
            self.logger
                .warn("record.city.no_stations", json!({ "city": label }));
            return summary;
        }

        // Stations that do not resolve or answer right now are skipped; only
        // a failed recording counts against the retry budget.
        let working = self.resolve_and_verify(&stations).await;
        for id in stations.keys().filter(|id| !working.contains_key(*id)) {
            self.logger
                .debug("record.station.unavailable", json!({ "stationId": id, "city": label }));
            summary.unavailable += 1;
        }
        if working.is_empty() {
            self.logger
                .warn("record.city.no_working_stations", json!({ "city": label }));
            return summary;
        }

        for (id, url) in &working {
            if self.record_station(id, url, label).await {
                summary.recorded += 1;
                continue;
            }
            summary.failed += 1;
            if self.monitor.should_retry(id) {
                let raw_url = stations.get(id).cloned().unwrap_or_else(|| url.clone());
                self.enqueue_retry(id, &raw_url, label, now);
                summary.retries_scheduled += 1;
            }
        }

        self.logger.info(
            "record.city.completed",
            json!({ "city": label, "summary": summary }),
        );
        summary
    }

    async fn retry_recording(&mut self, id: &str, raw_url: &str, city: &str, now: NaiveDateTime) {
        let entry = CatalogEntry::new(id, raw_url);
        let succeeded = match self.resolver.resolve_entry(&entry).await {
            Ok(resolved) => self.record_station(id, &resolved.url, city).await,
            Err(error) => {
                self.logger.error(
                    "record.retry.unresolved",
                    json!({ "stationId": id, "error": error.to_string() }),
                );
                self.monitor.mark_failed(id);
                false
            }
        };
        if succeeded {
            self.logger
                .info("record.retry.succeeded", json!({ "stationId": id, "city": city }));
            return;
        }

        match self.settings.retry_policy {
            RetryPolicy::Chained if self.monitor.should_retry(id) => {
                self.enqueue_retry(id, raw_url, city, now);
            }
            policy => {
                self.logger.warn(
                    "record.retry.not_rescheduled",
                    json!({
                        "stationId": id,
                        "city": city,
                        "policy": policy,
                        "failureCount": self.monitor.failure_count(id),
                    }),
                );
            }
        }
    }

    fn enqueue_retry(&mut self, id: &str, raw_url: &str, city: &str, now: NaiveDateTime) {
        let delay = self.monitor.retry_delay(id);
        self.queue.push(
            now + to_delta(delay),
            JobKind::Retry {
                id: id.to_string(),
                raw_url: raw_url.to_string(),
                city: city.to_string(),
            },
        );
        self.logger.info(
            "scheduler.retry_scheduled",
            json!({ "stationId": id, "city": city, "delaySeconds": delay.as_secs() }),
        );
    }

    /// One recording attempt. Updates the monitor and appends to the log
    /// sink on success.
    async fn record_station(&mut self, id: &str, url: &str, city: &str) -> bool {
        let job = RecordingJob {
            id: id.to_string(),
            url: url.to_string(),
            duration: self.settings.recording_duration,
            output_dir: self.settings.output_dir.join(city),
        };

        match self.recorder.record(&job).await {
            Ok(path) => {
                self.monitor.mark_working(id);
                let entry = RecordingLogEntry {
                    filename: path.display().to_string(),
                    duration_seconds: job.duration.as_secs(),
                    recorded_at: Utc::now(),
                    city: city.to_string(),
                };
                if let Err(err) = self.log.append(&entry).await {
                    self.logger.error(
                        "record.log_failed",
                        json!({ "path": self.log.path().display().to_string(), "error": err.to_string() }),
                    );
                }
                self.logger.info(
                    "record.succeeded",
                    json!({ "stationId": id, "city": city, "file": entry.filename }),
                );
                true
            }
            Err(error) => {
                self.monitor.mark_failed(id);
                self.logger.error(
                    "record.failed",
                    json!({
                        "stationId": id,
                        "city": city,
                        "url": url,
                        "error": error.to_string(),
                        "failureCount": self.monitor.failure_count(id),
                    }),
                );
                false
            }
        }
    }

    fn log_status(&self, report: &StatusReport) {
        self.logger.info(
            "monitor.status_report",
            json!({
                "workingCount": report.working_count,
                "failedCount": report.failed_count,
                "total": report.total,
                "report": report.to_string(),
            }),
        );
    }
}

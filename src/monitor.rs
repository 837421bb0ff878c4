use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::stations::{StationId, StationState, StationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    #[serde(rename = "workingCount")]
    pub working_count: usize,
    #[serde(rename = "failedCount")]
    pub failed_count: usize,
    pub total: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Status Report:\nWorking: {}/{}\nFailed: {}/{}",
            self.working_count, self.total, self.failed_count, self.total
        )
    }
}

/// Per-station working/failed bookkeeping with linear retry backoff.
///
/// Lives for the process only; a restart rebuilds it from a verification
/// pass. Owned by the scheduler loop, so it needs no locking.
#[derive(Debug, Clone)]
pub struct StationMonitor {
    max_retries: u32,
    base_delay: Duration,
    stations: HashMap<StationId, StationState>,
}

impl StationMonitor {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            stations: HashMap::new(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.retry_delay_seconds),
        )
    }

    pub fn mark_working(&mut self, id: &str) {
        let state = StationState {
            id: id.to_string(),
            status: StationStatus::Working,
            failure_count: 0,
            last_verified_at: Some(Utc::now()),
        };
        self.stations.insert(id.to_string(), state);
    }

    pub fn mark_failed(&mut self, id: &str) {
        let state = self
            .stations
            .entry(id.to_string())
            .or_insert_with(|| StationState {
                id: id.to_string(),
                status: StationStatus::Failed,
                failure_count: 0,
                last_verified_at: None,
            });
        if state.status == StationStatus::Working {
            state.failure_count = 0;
        }
        state.status = StationStatus::Failed;
        state.failure_count = state.failure_count.saturating_add(1);
    }

    pub fn failure_count(&self, id: &str) -> u32 {
        self.stations
            .get(id)
            .map(|state| state.failure_count)
            .unwrap_or(0)
    }

    pub fn should_retry(&self, id: &str) -> bool {
        self.failure_count(id) < self.max_retries
    }

    pub fn retry_delay(&self, id: &str) -> Duration {
        self.base_delay * (self.failure_count(id) + 1)
    }

    pub fn state(&self, id: &str) -> Option<&StationState> {
        self.stations.get(id)
    }

    pub fn status_report(&self) -> StatusReport {
        let working_count = self
            .stations
            .values()
            .filter(|state| state.status == StationStatus::Working)
            .count();
        let total = self.stations.len();
        StatusReport {
            working_count,
            failed_count: total - working_count,
            total,
        }
    }
}

impl Default for StationMonitor {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ID: &str = "Alif-riyadh-SA";

    #[test]
    fn retries_allowed_until_max_failures() {
        let mut monitor = StationMonitor::new(3, Duration::from_secs(300));
        assert!(monitor.should_retry(ID));

        monitor.mark_failed(ID);
        assert!(monitor.should_retry(ID));
        monitor.mark_failed(ID);
        assert!(monitor.should_retry(ID));
        monitor.mark_failed(ID);
        assert!(!monitor.should_retry(ID));
        assert_eq!(monitor.failure_count(ID), 3);
    }

    #[test]
    fn backoff_is_linear_in_failure_count() {
        let mut monitor = StationMonitor::default();
        assert_eq!(monitor.retry_delay(ID), Duration::from_secs(300));
        monitor.mark_failed(ID);
        assert_eq!(monitor.retry_delay(ID), Duration::from_secs(600));
        monitor.mark_failed(ID);
        assert_eq!(monitor.retry_delay(ID), Duration::from_secs(900));
    }

    #[test]
    fn working_clears_failures_and_records_timestamp() {
        let mut monitor = StationMonitor::default();
        monitor.mark_failed(ID);
        monitor.mark_failed(ID);
        monitor.mark_working(ID);
        monitor.mark_working(ID);

        let state = monitor.state(ID).unwrap();
        assert_eq!(state.status, StationStatus::Working);
        assert_eq!(state.failure_count, 0);
        assert!(state.last_verified_at.is_some());

        monitor.mark_failed(ID);
        assert_eq!(monitor.failure_count(ID), 1);
        assert!(monitor.state(ID).unwrap().last_verified_at.is_some());
    }

    #[test]
    fn status_report_counts_each_station_once() {
        let mut monitor = StationMonitor::default();
        monitor.mark_working("a");
        monitor.mark_working("b");
        monitor.mark_failed("c");
        monitor.mark_failed("c");
        monitor.mark_failed("b");

        let report = monitor.status_report();
        assert_eq!(
            report,
            StatusReport {
                working_count: 1,
                failed_count: 2,
                total: 3,
            }
        );
        assert_eq!(
            report.to_string(),
            "Status Report:\nWorking: 1/3\nFailed: 2/3"
        );
    }
}

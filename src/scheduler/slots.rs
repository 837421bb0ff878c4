use std::collections::BTreeSet;

use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::stations::StationId;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleEntry {
    pub city: String,
    #[serde(rename = "timeOfDay", serialize_with = "serialize_hhmm")]
    pub time_of_day: NaiveTime,
    #[serde(rename = "stationIds")]
    pub station_ids: BTreeSet<StationId>,
}

impl ScheduleEntry {
    pub fn time_label(&self) -> String {
        self.time_of_day.format("%H:%M").to_string()
    }
}

fn serialize_hhmm<S: serde::Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

fn time_from_minutes(minutes: u32) -> NaiveTime {
    let minutes = minutes % MINUTES_PER_DAY;
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// One slot every `every_hours` hours, starting at midnight.
pub fn fixed_interval_slots(every_hours: u32) -> Vec<NaiveTime> {
    let step = every_hours.clamp(1, 24);
    (0..24)
        .step_by(step as usize)
        .map(|hour| time_from_minutes(hour * 60))
        .collect()
}

/// Slot start times for a `[start_hour, end_hour)` window. When the window
/// holds fewer slots than `city_count`, the interval shrinks so that every
/// city still gets a slot of its own.
pub fn window_slots(
    start_hour: u32,
    end_hour: u32,
    interval_minutes: u32,
    city_count: usize,
) -> Vec<NaiveTime> {
    let total_minutes = end_hour.saturating_sub(start_hour) * 60;
    let mut interval = interval_minutes.max(1);
    let mut slots = (total_minutes / interval) as usize;

    if slots < city_count {
        // More cities than minutes cannot be kept inside the window; fall
        // back to one-minute spacing past its end.
        interval = (total_minutes / city_count as u32).max(1);
        slots = city_count;
    }

    (0..slots as u32)
        .map(|idx| time_from_minutes(start_hour * 60 + idx * interval))
        .collect()
}

/// Shuffles the window's slots and hands them to cities in iteration order.
/// A fresh assignment is drawn on every call.
pub fn randomized_window<R: Rng + ?Sized>(
    cities: &[String],
    start_hour: u32,
    end_hour: u32,
    interval_minutes: u32,
    rng: &mut R,
) -> Vec<(String, NaiveTime)> {
    let mut times = window_slots(start_hour, end_hour, interval_minutes, cities.len());
    times.shuffle(rng);
    cities.iter().cloned().zip(times).collect()
}

/// Next wall-clock instant at `time_of_day` strictly after `now`.
pub fn next_occurrence(now: NaiveDateTime, time_of_day: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(time_of_day);
    if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

pub fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn cities(count: usize) -> Vec<String> {
        (0..count).map(|idx| format!("city{idx}")).collect()
    }

    #[test]
    fn fixed_interval_covers_the_day() {
        let labels: Vec<_> = fixed_interval_slots(5)
            .into_iter()
            .map(|time| time.format("%H:%M").to_string())
            .collect();
        assert_eq!(labels, vec!["00:00", "05:00", "10:00", "15:00", "20:00"]);
        assert_eq!(fixed_interval_slots(2).len(), 12);
        assert_eq!(fixed_interval_slots(0).len(), 24);
    }

    #[test]
    fn window_shrinks_interval_when_cities_outnumber_slots() {
        let slots = window_slots(0, 1, 30, 5);
        let minutes: Vec<_> = slots.iter().map(|time| minute_of_day(*time)).collect();
        assert_eq!(minutes, vec![0, 12, 24, 36, 48]);
    }

    #[test]
    fn every_city_gets_a_unique_slot_when_crowded() {
        let cities = cities(7);
        let mut rng = StdRng::seed_from_u64(7);
        let plan = randomized_window(&cities, 8, 9, 30, &mut rng);

        assert_eq!(plan.len(), cities.len());
        let assigned: HashSet<_> = plan.iter().map(|(city, _)| city.clone()).collect();
        assert_eq!(assigned.len(), cities.len());
        let times: HashSet<_> = plan.iter().map(|(_, time)| *time).collect();
        assert_eq!(times.len(), cities.len());
        for (_, time) in &plan {
            let minute = minute_of_day(*time);
            assert!((8 * 60..9 * 60).contains(&minute));
        }
    }

    #[test]
    fn roomy_window_uses_interval_grid() {
        let cities = cities(3);
        let mut rng = StdRng::seed_from_u64(42);
        let plan = randomized_window(&cities, 6, 22, 30, &mut rng);

        assert_eq!(plan.len(), 3);
        let times: HashSet<_> = plan.iter().map(|(_, time)| *time).collect();
        assert_eq!(times.len(), 3);
        for (_, time) in &plan {
            let minute = minute_of_day(*time);
            assert_eq!(minute % 30, 0);
            assert!((6 * 60..22 * 60).contains(&minute));
        }
    }

    #[test]
    fn same_seed_same_plan() {
        let cities = cities(4);
        let first = randomized_window(&cities, 0, 24, 30, &mut StdRng::seed_from_u64(9));
        let second = randomized_window(&cities, 0, 24, 30, &mut StdRng::seed_from_u64(9));
        assert_eq!(first, second);
    }

    #[test]
    fn next_occurrence_rolls_over_to_tomorrow() {
        let now = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let later = NaiveTime::from_hms_opt(11, 30, 0).unwrap();
        let earlier = NaiveTime::from_hms_opt(9, 0, 0).unwrap();

        assert_eq!(next_occurrence(now, later), now.date().and_time(later));
        assert_eq!(
            next_occurrence(now, earlier),
            now.date().and_time(earlier) + TimeDelta::days(1)
        );
        assert_eq!(
            next_occurrence(now, now.time()),
            now + TimeDelta::days(1)
        );
    }
}

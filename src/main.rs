use std::env;

use anyhow::{anyhow, Context};
use chrono::Local;
use radio_recorder::{config::Config, logging::Logger, AppState, LivenessProbe};
use serde_json::json;

const USAGE: &str = "usage: radio-recorder-rs [run | run-fixed | repeat <minutes> | list-times | verify | record-now <city> | record-country <code> | list [country] | list-cities | search <fragment> | resolve <url> | check-config]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new("radio-recorder-rs");
    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("run");
    let argument = args.get(1).map(String::as_str);

    let config = Config::load().context("failed to load configuration")?;

    if command == "check-config" {
        logger.info(
            "config.check_passed",
            serde_json::to_value(&config).unwrap_or_else(|_| json!({ "status": "ok" })),
        );
        return Ok(());
    }

    let state = AppState::initialize(config.clone(), logger.clone())
        .context("failed to initialize application state")?;

    match command {
        "list-cities" => {
            for city in state.catalog.cities() {
                let code = state.catalog.country_for_city(&city).unwrap_or("??");
                let count = state.catalog.stations_for_city(&city).len();
                println!("{city} ({code}): {count} stations");
            }
            Ok(())
        }
        "list" => {
            let stations = match argument {
                Some(code) => state.catalog.stations_for_country(code),
                None => state
                    .catalog
                    .entries()
                    .into_iter()
                    .map(|entry| (entry.id, entry.raw_url))
                    .collect(),
            };
            if stations.is_empty() {
                return Err(anyhow!(
                    "no stations for country `{}`",
                    argument.unwrap_or_default()
                ));
            }
            for (id, url) in stations {
                println!("{id}: {url}");
            }
            Ok(())
        }
        "search" => {
            let fragment = argument.ok_or_else(|| anyhow!("search needs a fragment\n{USAGE}"))?;
            for (id, url) in state.catalog.search(fragment) {
                println!("{id}: {url}");
            }
            Ok(())
        }
        "resolve" => {
            let url = argument.ok_or_else(|| anyhow!("resolve needs a url\n{USAGE}"))?;
            let resolved = state.resolver().resolve(url).await?;
            let alive = state.health_verifier().is_alive(&resolved).await;
            logger.info(
                "resolve.completed",
                json!({ "url": url, "streamUrl": resolved, "alive": alive }),
            );
            println!("{resolved}");
            Ok(())
        }
        "verify" => {
            let mut scheduler = state.scheduler();
            let report = scheduler.verify_all_stations().await;
            println!("{report}");
            Ok(())
        }
        "list-times" => {
            let mut scheduler = state.scheduler();
            let plan = scheduler.schedule_randomized(
                Local::now().naive_local(),
                config.schedule.start_hour,
                config.schedule.end_hour,
                config.schedule.interval_minutes,
                &mut rand::rng(),
            );
            println!("Scheduled recording times:");
            for entry in plan {
                println!("{}: {}", entry.city, entry.time_label());
            }
            Ok(())
        }
        "record-now" => {
            let city = argument.ok_or_else(|| anyhow!("record-now needs a city\n{USAGE}"))?;
            let mut scheduler = state.scheduler();
            let summary = scheduler
                .record_city(city, Local::now().naive_local())
                .await;
            logger.info("record.now.completed", json!({ "city": city, "summary": summary }));
            Ok(())
        }
        "record-country" => {
            let code =
                argument.ok_or_else(|| anyhow!("record-country needs a country code\n{USAGE}"))?;
            let mut scheduler = state.scheduler();
            let summary = scheduler
                .record_country(code, Local::now().naive_local())
                .await;
            logger.info(
                "record.country.completed",
                json!({ "country": code, "summary": summary }),
            );
            Ok(())
        }
        "repeat" => {
            let minutes: u32 = argument
                .ok_or_else(|| anyhow!("repeat needs a number of minutes\n{USAGE}"))?
                .parse()
                .context("repeat interval must be a whole number of minutes")?;
            let mut scheduler = state.scheduler();
            scheduler.verify_all_stations().await;
            let now = Local::now().naive_local();
            scheduler.schedule_repeating(now, minutes);
            scheduler.schedule_status_reports(now);
            scheduler.run().await
        }
        "run-fixed" => {
            let mut scheduler = state.scheduler();
            scheduler.verify_all_stations().await;
            let now = Local::now().naive_local();
            scheduler.schedule_fixed(now, config.schedule.fixed_every_hours);
            scheduler.schedule_status_reports(now);
            scheduler.run().await
        }
        "run" => {
            let mut scheduler = state.scheduler();
            scheduler.verify_all_stations().await;
            let now = Local::now().naive_local();
            scheduler.schedule_randomized(
                now,
                config.schedule.start_hour,
                config.schedule.end_hour,
                config.schedule.interval_minutes,
                &mut rand::rng(),
            );
            scheduler.schedule_status_reports(now);
            scheduler.run().await
        }
        other => Err(anyhow!("unknown command `{other}`\n{USAGE}")),
    }
}

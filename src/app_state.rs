use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use reqwest::Client;
use serde_json::json;

use crate::{
    batch::BatchVerifier,
    config::Config,
    health::HealthVerifier,
    logging::Logger,
    monitor::StationMonitor,
    recorder::FfmpegRecorder,
    recording_log::RecordingLog,
    resolver::StreamUrlResolver,
    scheduler::{RecordingScheduler, SchedulerDeps, SchedulerSettings},
    stations::Catalog,
};

/// Everything a command needs, built once in `main` and passed down.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub logger: Logger,
    pub http_client: Client,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    pub fn initialize(config: Config, logger: Logger) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build http client")?;

        let catalog = Catalog::load(&config.stations_file).with_context(|| {
            format!(
                "failed to load stations from {}",
                config.stations_file.display()
            )
        })?;
        if catalog.is_empty() {
            bail!(
                "station catalog {} contains no stations",
                config.stations_file.display()
            );
        }
        logger.info(
            "catalog.loaded",
            json!({
                "path": config.stations_file.display().to_string(),
                "stations": catalog.len(),
                "cities": catalog.cities().len(),
            }),
        );

        Ok(Self {
            config,
            logger,
            http_client,
            catalog: Arc::new(catalog),
        })
    }

    pub fn resolver(&self) -> StreamUrlResolver {
        StreamUrlResolver::new(
            self.http_client.clone(),
            self.config.resolver.timeout(),
            self.logger.clone(),
        )
    }

    pub fn health_verifier(&self) -> HealthVerifier {
        HealthVerifier::new(
            self.http_client.clone(),
            self.config.verification.timeout(),
            self.logger.clone(),
        )
    }

    pub fn batch_verifier(&self) -> BatchVerifier {
        BatchVerifier::new(Arc::new(self.health_verifier()), self.logger.clone())
    }

    pub fn scheduler(&self) -> RecordingScheduler {
        let deps = SchedulerDeps {
            catalog: self.catalog.clone(),
            resolver: self.resolver(),
            verifier: self.batch_verifier(),
            recorder: Arc::new(
                FfmpegRecorder::new(
                    self.config.recording.ffmpeg_binary.clone(),
                    self.logger.clone(),
                )
                .with_grace(Duration::from_secs(self.config.recording.grace_seconds)),
            ),
            log: RecordingLog::new(self.config.recording.log_file.clone()),
            monitor: StationMonitor::from_config(&self.config.monitor),
            logger: self.logger.clone(),
        };
        RecordingScheduler::new(deps, SchedulerSettings::from_config(&self.config))
    }
}

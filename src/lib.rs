pub mod app_state;
pub mod batch;
pub mod config;
pub mod health;
pub mod logging;
pub mod monitor;
pub mod recorder;
pub mod recording_log;
pub mod resolver;
pub mod scheduler;
pub mod stations;
pub mod stream_format;

pub use app_state::AppState;
pub use batch::BatchVerifier;
pub use health::{HealthVerifier, LivenessProbe};
pub use monitor::{StationMonitor, StatusReport};
pub use resolver::{ResolveError, StreamUrlResolver};
pub use scheduler::RecordingScheduler;

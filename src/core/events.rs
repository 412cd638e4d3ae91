use tracing::{info, warn};

/// Structured events emitted by the core pipeline, consumed by the CLI's
/// progress/log rendering. Keeps printing out of the core components
/// themselves (teacher's `EngineEvent` plays the same role for its engine).
/// Rendering today is `tracing`, same as every other core diagnostic; the
/// enum exists as the seam a future non-`tracing` CLI frontend would hook
/// into, matching the teacher's split between engine events and UI.
#[derive(Debug, Clone)]
pub enum DriverEvent {
    SeedProgress { source: String, bytes_matched: u64, total: u64 },
    UrlAttempt { url: String },
    UrlPoisoned { url: String, reason: String },
    Info { message: String },
    Warn { message: String },
}

impl DriverEvent {
    pub fn emit(&self) {
        match self {
            DriverEvent::SeedProgress { source, bytes_matched, total } => {
                info!(source, bytes_matched, total, "seed read, target partially matched")
            }
            DriverEvent::UrlAttempt { url } => info!(url, "attempting fetch from candidate URL"),
            DriverEvent::UrlPoisoned { url, reason } => warn!(url, reason, "candidate URL poisoned"),
            DriverEvent::Info { message } => info!("{message}"),
            DriverEvent::Warn { message } => warn!("{message}"),
        }
    }
}

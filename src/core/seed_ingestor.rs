use std::path::Path;

use tracing::warn;

use crate::core::events::DriverEvent;
use crate::core::model::ClientState;
use crate::decompress::gunzip_async;
use crate::matcher::MatchSession;

/// C3: feeds local seed files (the output path's own previous contents,
/// `-i` candidates, etc.) through the matcher before any network traffic
/// happens (spec §4.3). Grounded in `original_source/client.c`'s
/// `read_seed_file`.
pub struct SeedIngestor;

impl SeedIngestor {
    /// Open-failures are tolerated: a missing or unreadable seed is logged
    /// and skipped rather than failing the run, matching the original's
    /// behavior of treating seeds as opportunistic, not required.
    pub async fn ingest(state: &ClientState, session: &MatchSession, path: &Path, source_label: &str) {
        let raw = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "seed unavailable, skipping");
                return;
            }
        };

        let data = if session.hint_decompress() && path.extension().map(|e| e == "gz").unwrap_or(false) {
            match gunzip_async(raw).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "seed decompression failed, skipping");
                    return;
                }
            }
        } else {
            raw
        };

        if let Err(e) = session.submit_source(&data).await {
            warn!(path = %path.display(), error = %e, "error while matching seed, skipping");
            return;
        }

        let (matched, total) = session.progress().await;
        DriverEvent::SeedProgress { source: source_label.to_string(), bytes_matched: matched, total }.emit();
        let mut handle = state.progress.start(source_label, Some(total)).await;
        handle.set_position(matched, total).await;
        handle.finish("seed matched").await;
    }
}

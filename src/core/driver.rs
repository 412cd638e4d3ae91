use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::core::fetch_scheduler::FetchScheduler;
use crate::core::installer::Installer;
use crate::core::model::{CandidateUrlSet, ChecksumStatus, ClientState, RunReport};
use crate::core::name_deriver::NameDeriver;
use crate::core::seed_ingestor::SeedIngestor;
use crate::decompress::gunzip_async;
use crate::error::{ClientError, Result};
use crate::http::HttpCollaborator;
use crate::matcher::MatchSession;
use crate::progress::ProgressCollaborator;

/// Where the control document for this run came from, kept around only to
/// decide whether it should become the initial HTTP referrer.
enum ControlSource {
    Local,
    Http { url: String },
}

pub struct RunRequest {
    pub control_location: String,
    pub output_override: Option<PathBuf>,
    pub seed_paths: Vec<PathBuf>,
    pub referrer: Option<String>,
    pub quiet: bool,
    /// `-k <keepPath>`: save a local copy of the fetched control document
    /// (spec §6.5 / SPEC_FULL supplemented features). `None` if the control
    /// document was already local, or the caller didn't ask.
    pub keep_control_path: Option<PathBuf>,
    pub rng_seed: u64,
}

/// C7: the end-to-end orchestration pipeline (spec §4.7). Grounded in
/// `original_source/client.c`'s `zsync_client`.
pub struct ClientDriver;

impl ClientDriver {
    pub async fn run(
        http: Arc<dyn HttpCollaborator>,
        progress: Arc<dyn ProgressCollaborator>,
        req: RunRequest,
    ) -> Result<RunReport> {
        let state = ClientState::new(http, progress, req.quiet, req.referrer.clone(), req.rng_seed);

        // Step 1-3: acquire the control document, trying a local path first
        // and falling back to treating the location as a URL, then parse it
        // (`MatchSession::begin` folds in `MatcherLib.begin`).
        let (raw, source) = Self::acquire_control_document(&state, &req.control_location).await?;

        if let Some(keep_path) = &req.keep_control_path {
            if let Err(e) = tokio::fs::write(keep_path, &raw).await {
                warn!(path = %keep_path.display(), error = %e, "failed to save a local copy of the control document");
            }
        }

        let scratch_dir = req
            .output_override
            .as_ref()
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let session = MatchSession::begin(&raw, &scratch_dir).await?;

        if let ControlSource::Http { url } = &source {
            state.set_referrer(url.clone()).await;
        }

        // Step 4: derive the output filename and the `.part` working path.
        let advisory = session.filename();
        let output_name = NameDeriver::derive(advisory.as_deref(), &req.control_location);
        let target_path = req.output_override.clone().unwrap_or_else(|| PathBuf::from(&output_name));
        let working_path = Self::part_path(&target_path);

        // Step 5: ingest seeds in caller order, then the output path's own
        // current contents, then any prior `.part` left by a previous run.
        for seed in &req.seed_paths {
            SeedIngestor::ingest(&state, &session, seed, &seed.display().to_string()).await;
        }
        SeedIngestor::ingest(&state, &session, &target_path, &target_path.display().to_string()).await;
        SeedIngestor::ingest(&state, &session, &working_path, &working_path.display().to_string()).await;

        let (matched, total) = session.progress().await;
        info!(matched, total, "local matching complete, starting network fetch");

        // Step 6: the matcher's scratch file becomes the resumable `.part`
        // before any network traffic starts.
        session.rename_scratch(&working_path).await?;

        // Step 7: fetch whatever is still missing over HTTP. Any scheduler
        // failure leaves `working_path` in place for the user/a future run
        // to resume from (spec §4.7 step 7, §7).
        let (urls, content_type) = session.candidates()?;
        let mut candidates = CandidateUrlSet::new(urls, content_type);
        FetchScheduler::run(&state, &session, &mut candidates).await?;

        // Step 8: verify the assembled file against the control document's
        // checksums. A mismatch also leaves `working_path` in place.
        let verify_status = session.complete().await?;
        if verify_status < 0 {
            return Err(ClientError::VerificationFailed { part_path: session.end().await });
        }

        // Step 9: finalize the session, obtaining the (possibly renamed
        // again) final working path.
        let mtime = session.mtime();
        let working_path = session.end().await;

        // Step 10: move the verified file into place.
        Installer::install(&working_path, &target_path, mtime).await?;

        let http_bytes_downloaded = *state.http_bytes_downloaded.lock().await;
        let checksum_status = if verify_status == 0 { ChecksumStatus::NoneAvailable } else { ChecksumStatus::Ok };

        Ok(RunReport {
            local_used: matched,
            http_bytes_downloaded,
            final_path: target_path,
            checksum_status,
        })
    }

    fn part_path(target_path: &Path) -> PathBuf {
        let mut name = target_path.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }

    async fn acquire_control_document(state: &ClientState, location: &str) -> Result<(Vec<u8>, ControlSource)> {
        if let Ok(data) = tokio::fs::read(location).await {
            return Ok((data, ControlSource::Local));
        }

        let url = location.to_string();
        match state.http.get(&url).await {
            Ok(mut data) => {
                if url.ends_with(".gz") {
                    data = gunzip_async(data).await?;
                }
                Ok((data, ControlSource::Http { url }))
            }
            Err(e) => {
                warn!(location, error = %e, "could not acquire control document");
                Err(ClientError::ControlFileUnavailable { location: location.to_string() })
            }
        }
    }
}

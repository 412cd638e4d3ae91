use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use tokio::sync::Mutex;

use crate::http::HttpCollaborator;
use crate::progress::ProgressCollaborator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Plain,
    Compressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlStatus {
    Usable,
    Poisoned,
}

/// Candidate source URLs for a run, all sharing one content type (spec §3).
#[derive(Debug, Clone)]
pub struct CandidateUrlSet {
    pub urls: Vec<String>,
    pub content_type: ContentType,
    pub status: Vec<UrlStatus>,
}

impl CandidateUrlSet {
    pub fn new(urls: Vec<String>, content_type: ContentType) -> Self {
        let status = vec![UrlStatus::Usable; urls.len()];
        Self { urls, content_type, status }
    }

    pub fn usable_count(&self) -> usize {
        self.status.iter().filter(|s| **s == UrlStatus::Usable).count()
    }

    pub fn poison(&mut self, idx: usize) {
        self.status[idx] = UrlStatus::Poisoned;
    }
}

/// Ephemeral per-run configuration bundle (spec §3). Owns the injected
/// collaborators and the run's mutable bookkeeping (referrer, byte counter,
/// PRNG).
pub struct ClientState {
    pub http: Arc<dyn HttpCollaborator>,
    pub progress: Arc<dyn ProgressCollaborator>,
    pub quiet: bool,
    pub referrer: Mutex<Option<String>>,
    pub http_bytes_downloaded: Mutex<u64>,
    pub rng: Mutex<StdRng>,
}

impl ClientState {
    pub fn new(
        http: Arc<dyn HttpCollaborator>,
        progress: Arc<dyn ProgressCollaborator>,
        quiet: bool,
        referrer: Option<String>,
        rng_seed: u64,
    ) -> Self {
        use rand::SeedableRng;
        Self {
            http,
            progress,
            quiet,
            referrer: Mutex::new(referrer),
            http_bytes_downloaded: Mutex::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(rng_seed)),
        }
    }

    pub async fn add_http_bytes(&self, n: u64) {
        let mut v = self.http_bytes_downloaded.lock().await;
        *v += n;
    }

    pub async fn set_referrer(&self, r: String) {
        *self.referrer.lock().await = Some(r);
    }

    pub async fn referrer(&self) -> Option<String> {
        self.referrer.lock().await.clone()
    }
}

/// Final outcome of a `ClientDriver` run (spec §3, §7).
#[derive(Debug, Clone)]
pub struct RunReport {
    pub local_used: u64,
    pub http_bytes_downloaded: u64,
    pub final_path: PathBuf,
    pub checksum_status: ChecksumStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    NoneAvailable,
    Ok,
}

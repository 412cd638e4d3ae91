use rand::Rng;

use crate::core::events::DriverEvent;
use crate::core::model::{CandidateUrlSet, ClientState};
use crate::core::range_downloader::RangeDownloader;
use crate::error::{ClientError, Result};
use crate::matcher::MatchSession;

/// C5: drives `RangeDownloader` against a random usable candidate URL,
/// poisoning failures and retrying, until the session is complete or no
/// usable URL remains (spec §4.5). Grounded in
/// `original_source/client.c`'s `fetch_remaining_blocks` (including its
/// `rand_r(&seed) % n` URL choice).
pub struct FetchScheduler;

impl FetchScheduler {
    pub async fn run(state: &ClientState, session: &MatchSession, candidates: &mut CandidateUrlSet) -> Result<()> {
        let (_, content_type) = session.candidates()?;

        loop {
            if session.needed_ranges(content_type).await?.is_empty() {
                return Ok(());
            }
            if candidates.usable_count() == 0 {
                break;
            }

            let idx = Self::pick_usable(state, candidates).await;
            let url = candidates.urls[idx].clone();
            DriverEvent::UrlAttempt { url: url.clone() }.emit();

            match RangeDownloader::run(state, session, &url).await {
                Ok(true) => continue,
                Ok(false) => {
                    DriverEvent::UrlPoisoned { url, reason: "fetch left the session incomplete".to_string() }.emit();
                    candidates.poison(idx);
                }
                Err(e) => {
                    DriverEvent::UrlPoisoned { url, reason: e.to_string() }.emit();
                    candidates.poison(idx);
                }
            }
        }

        Err(ClientError::DownloadIncomplete { part_path: session.end().await })
    }

    /// Picks a uniformly random usable candidate index, matching the
    /// original's `rand_r(&seed) % n` over the live (unpoisoned) set.
    async fn pick_usable(state: &ClientState, candidates: &CandidateUrlSet) -> usize {
        let usable: Vec<usize> = candidates
            .status
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == crate::core::model::UrlStatus::Usable)
            .map(|(i, _)| i)
            .collect();

        let mut rng = state.rng.lock().await;
        let pick = rng.gen_range(0..usable.len());
        usable[pick]
    }
}

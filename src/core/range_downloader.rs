use tracing::{debug, warn};

use crate::core::model::ClientState;
use crate::core::url_resolver::UrlResolver;
use crate::error::Result;
use crate::http::RangeBlock;
use crate::matcher::MatchSession;

/// C4: fetches every byte span `MatchSession` still needs from a single
/// candidate URL (spec §4.4). Grounded in
/// `original_source/client.c`'s `fetch_remaining_blocks_http`.
pub struct RangeDownloader;

impl RangeDownloader {
    /// Returns `Ok(true)` if the URL fully satisfied the session (or
    /// nothing was needed), `Ok(false)` if the fetch ended with the
    /// session still incomplete for a reason that should poison the URL
    /// and let the caller try another one.
    pub async fn run(state: &ClientState, session: &MatchSession, url: &str) -> Result<bool> {
        let referrer = state.referrer().await;
        let resolved = UrlResolver::resolve(referrer.as_deref(), url)?;

        let (_, content_type) = session.candidates()?;
        let needed = session.needed_ranges(content_type).await?;
        if needed.is_empty() {
            return Ok(true);
        }

        let mut handle = state.http.range_fetch_start(&resolved).await?;
        handle.add_ranges(&needed).await?;

        let mut receiver = session.begin_receive(content_type).await?;

        let (matched, total) = session.progress().await;
        let mut progress_handle = state.progress.start(&resolved, Some(total)).await;
        progress_handle.set_position(matched, total).await;

        let mut next_offset = needed[0].0;

        loop {
            match handle.get_range_block().await {
                Ok(RangeBlock::Data { offset, data }) => {
                    next_offset = offset + data.len() as u64;
                    if let Err(e) = receiver.receive_data(Some(&data), offset).await {
                        warn!(url = resolved, error = %e, "receiver rejected delivered data");
                        receiver.end_receive().await?;
                        state.add_http_bytes(handle.bytes_down()).await;
                        progress_handle.finish("receiver rejected data").await;
                        return Err(e);
                    }
                    let (matched, total) = session.progress().await;
                    progress_handle.set_position(matched, total).await;
                }
                Ok(RangeBlock::Eof) => {
                    // Final empty-chunk flush, matching the original's read
                    // loop which always calls the receive callback once
                    // more with a zero-length buffer before tearing down.
                    if let Err(e) = receiver.receive_data(Some(&[]), next_offset).await {
                        warn!(url = resolved, error = %e, "receiver rejected final flush");
                        receiver.end_receive().await?;
                        state.add_http_bytes(handle.bytes_down()).await;
                        progress_handle.finish("receiver rejected data").await;
                        return Err(e);
                    }
                    break;
                }
                Err(e) => {
                    warn!(url = resolved, error = %e, "range fetch failed mid-stream");
                    receiver.end_receive().await?;
                    state.add_http_bytes(handle.bytes_down()).await;
                    progress_handle.finish("range fetch failed").await;
                    return Ok(false);
                }
            }
        }

        receiver.end_receive().await?;
        state.add_http_bytes(handle.bytes_down()).await;

        let remaining = session.needed_ranges(content_type).await?;
        debug!(remaining = remaining.len(), "range downloader pass complete");
        let (matched, total) = session.progress().await;
        progress_handle.set_position(matched, total).await;
        progress_handle.finish(if remaining.is_empty() { "fetched" } else { "partial" }).await;
        Ok(remaining.is_empty())
    }
}

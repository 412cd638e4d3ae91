use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::core::model::ContentType;
use crate::error::{ClientError, Result};
use crate::matcher::control::ControlDocument;
use crate::matcher::rolling::RollingChecksum;
use crate::matcher::strong_checksum;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Missing,
    Got,
}

/// Tracks which byte spans of the scratch file have been written, so
/// `receive_data` (whose chunk boundaries need not align with block
/// boundaries) can tell when a block becomes fully covered.
#[derive(Default)]
struct Coverage {
    intervals: Vec<(u64, u64)>,
}

impl Coverage {
    fn insert(&mut self, s: u64, e: u64) {
        if s >= e {
            return;
        }
        self.intervals.push((s, e));
        self.intervals.sort_unstable();
        let mut merged: Vec<(u64, u64)> = Vec::with_capacity(self.intervals.len());
        for (s, e) in self.intervals.drain(..) {
            if let Some(last) = merged.last_mut() {
                if s <= last.1 {
                    last.1 = last.1.max(e);
                    continue;
                }
            }
            merged.push((s, e));
        }
        self.intervals = merged;
    }

    fn covers(&self, s: u64, e: u64) -> bool {
        self.intervals.iter().any(|&(is, ie)| is <= s && e <= ie)
    }
}

/// C8 (SPEC_FULL §2): the live state produced from a `ControlDocument`
/// (spec §3 `MatchSession`). Owns the scratch file for the duration of the
/// run.
pub struct MatchSession {
    pub doc: ControlDocument,
    weak_index: HashMap<u32, Vec<usize>>,
    scratch_path: tokio::sync::Mutex<PathBuf>,
    file: tokio::sync::Mutex<tokio::fs::File>,
    block_state: tokio::sync::Mutex<Vec<BlockState>>,
    coverage: tokio::sync::Mutex<Coverage>,
    verified: tokio::sync::Mutex<bool>,
}

impl MatchSession {
    pub async fn begin(data: &[u8], scratch_dir: &Path) -> Result<Self> {
        let doc = ControlDocument::parse(data)?;

        let mut weak_index: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, b) in doc.blocks.iter().enumerate() {
            weak_index.entry(b.weak).or_default().push(i);
        }

        tokio::fs::create_dir_all(scratch_dir).await?;
        let tmp = tempfile::Builder::new()
            .prefix(".zrsync-scratch-")
            .tempfile_in(scratch_dir)
            .map_err(ClientError::Io)?;
        let (std_file, scratch_path) = tmp.keep().map_err(|e| ClientError::Io(e.error))?;
        if doc.length > 0 {
            std_file.set_len(doc.length).ok();
        }
        let file = tokio::fs::File::from_std(std_file);

        let block_count = doc.block_count() as usize;
        Ok(Self {
            doc,
            weak_index,
            scratch_path: tokio::sync::Mutex::new(scratch_path),
            file: tokio::sync::Mutex::new(file),
            block_state: tokio::sync::Mutex::new(vec![BlockState::Missing; block_count]),
            coverage: tokio::sync::Mutex::new(Coverage::default()),
            verified: tokio::sync::Mutex::new(false),
        })
    }

    pub fn hint_decompress(&self) -> bool {
        self.doc.hint_decompress
    }

    pub fn filename(&self) -> Option<String> {
        self.doc.filename.clone()
    }

    pub fn mtime(&self) -> Option<i64> {
        self.doc.mtime
    }

    pub fn candidates(&self) -> Result<(Vec<String>, ContentType)> {
        self.doc.candidates()
    }

    pub async fn progress(&self) -> (u64, u64) {
        let states = self.block_state.lock().await;
        let mut matched = 0u64;
        for (i, s) in states.iter().enumerate() {
            if *s == BlockState::Got {
                matched += self.doc.block_len(i as u64);
            }
        }
        (matched, self.doc.length)
    }

    pub async fn status(&self) -> i32 {
        if *self.verified.lock().await {
            return 2;
        }
        let states = self.block_state.lock().await;
        if states.iter().any(|s| *s == BlockState::Got) {
            1
        } else {
            0
        }
    }

    async fn write_block(&self, block_idx: usize, data: &[u8]) -> Result<()> {
        let start = block_idx as u64 * self.doc.block_size as u64;
        let mut f = self.file.lock().await;
        f.seek(std::io::SeekFrom::Start(start)).await?;
        f.write_all(data).await?;
        drop(f);

        let mut states = self.block_state.lock().await;
        states[block_idx] = BlockState::Got;
        Ok(())
    }

    /// C3 support: feed a local byte source through the matcher. First tries
    /// a whole-file alignment fast path (seed equals target byte for byte,
    /// or is a prior version with identical leading blocks), then a rolling
    /// scan for block-aligned matches elsewhere in the buffer.
    pub async fn submit_source(&self, buffer: &[u8]) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let bs = self.doc.block_size as usize;
        let block_count = self.doc.block_count() as usize;

        // Fast path: block-aligned direct comparison (handles "seed equals
        // target" and "prior version with unchanged blocks" without
        // depending on the rolling scan finding the same alignment).
        for idx in 0..block_count {
            {
                let states = self.block_state.lock().await;
                if states[idx] == BlockState::Got {
                    continue;
                }
            }
            let start = idx * bs;
            let len = self.doc.block_len(idx as u64) as usize;
            if start + len > buffer.len() {
                continue;
            }
            let window = &buffer[start..start + len];
            let strong = strong_checksum(window, self.doc.checksum_bytes);
            if strong == self.doc.blocks[idx].strong {
                self.write_block(idx, window).await?;
                let mut cov = self.coverage.lock().await;
                cov.insert(start as u64, (start + len) as u64);
            }
        }

        // Rolling scan over full-size blocks only (spec.md's Non-goals
        // exclude a tuned matcher; matching the trailing short block via
        // the rolling window is skipped as a deliberate simplification,
        // noted in DESIGN.md).
        if bs > 0 && buffer.len() >= bs {
            let mut pos = 0usize;
            let mut rc = RollingChecksum::new(&buffer[pos..pos + bs]);
            loop {
                let weak = rc.value();
                let mut matched_here = false;
                if let Some(candidates) = self.weak_index.get(&weak) {
                    for &block_idx in candidates {
                        if self.doc.block_len(block_idx as u64) as usize != bs {
                            continue;
                        }
                        {
                            let states = self.block_state.lock().await;
                            if states[block_idx] == BlockState::Got {
                                continue;
                            }
                        }
                        let window = &buffer[pos..pos + bs];
                        let strong = strong_checksum(window, self.doc.checksum_bytes);
                        if strong == self.doc.blocks[block_idx].strong {
                            self.write_block(block_idx, window).await?;
                            let mut cov = self.coverage.lock().await;
                            cov.insert(pos as u64, (pos + bs) as u64);
                            matched_here = true;
                            break;
                        }
                    }
                }

                if matched_here {
                    pos += bs;
                    if pos + bs > buffer.len() {
                        break;
                    }
                    rc = RollingChecksum::new(&buffer[pos..pos + bs]);
                } else {
                    if pos + bs >= buffer.len() {
                        break;
                    }
                    rc.roll(buffer[pos], buffer[pos + bs]);
                    pos += 1;
                }
            }
        }

        Ok(())
    }

    /// Half-open `[start, end)` byte ranges still missing. For `Compressed`
    /// content this matcher cannot seek mid-stream, so it reports either
    /// "nothing left" or the single span covering the whole compressed
    /// resource (see module docs / DESIGN.md).
    pub async fn needed_ranges(&self, content_type: ContentType) -> Result<Vec<(u64, u64)>> {
        match content_type {
            ContentType::Plain => {
                let states = self.block_state.lock().await;
                let mut ranges = Vec::new();
                let mut run_start: Option<u64> = None;
                for (i, s) in states.iter().enumerate() {
                    let start = i as u64 * self.doc.block_size as u64;
                    let end = start + self.doc.block_len(i as u64);
                    if *s == BlockState::Missing {
                        if run_start.is_none() {
                            run_start = Some(start);
                        }
                    } else if let Some(rs) = run_start.take() {
                        ranges.push((rs, start));
                        let _ = end;
                    }
                }
                if let Some(rs) = run_start {
                    ranges.push((rs, self.doc.length));
                }
                Ok(ranges)
            }
            ContentType::Compressed => {
                let states = self.block_state.lock().await;
                if states.iter().all(|s| *s == BlockState::Got) {
                    Ok(vec![])
                } else {
                    // The compressed resource's own length isn't known (it
                    // differs from `doc.length`, which describes the
                    // decompressed target) and this matcher can't seek
                    // mid-gzip-stream anyway, so the single span requested
                    // is open-ended: "from the start to wherever the
                    // resource ends" (`u64::MAX` is the sentinel the HTTP
                    // collaborator renders as an open `Range: bytes=0-`).
                    Ok(vec![(0, u64::MAX)])
                }
            }
        }
    }

    pub async fn begin_receive(&self, content_type: ContentType) -> Result<Receiver<'_>> {
        Ok(Receiver {
            session: self,
            content_type,
            decompressor: match content_type {
                ContentType::Compressed => Some(flate2::Decompress::new(false)),
                ContentType::Plain => None,
            },
            decompressed_cursor: 0,
        })
    }

    pub async fn rename_scratch(&self, new_path: &Path) -> Result<()> {
        let mut f = self.file.lock().await;
        f.flush().await?;
        drop(f);

        let mut path = self.scratch_path.lock().await;
        if let Some(parent) = new_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&*path, new_path).await?;
        *path = new_path.to_path_buf();
        Ok(())
    }

    /// Re-reads the scratch file and recomputes every block's strong
    /// checksum. Returns `-1` on mismatch, `0` when no checksum was
    /// configured, `1` on success (spec §6.3 `complete`).
    pub async fn complete(&self) -> Result<i32> {
        if self.doc.checksum_bytes == 0 {
            return Ok(0);
        }

        let path = self.scratch_path.lock().await.clone();
        let mut f = tokio::fs::File::open(&path).await?;
        let mut buffer = Vec::new();
        f.read_to_end(&mut buffer).await?;

        if buffer.len() as u64 != self.doc.length {
            warn!(expected = self.doc.length, actual = buffer.len(), "scratch file length mismatch at verify time");
            return Ok(-1);
        }

        for idx in 0..self.doc.block_count() as usize {
            let start = idx * self.doc.block_size as usize;
            let len = self.doc.block_len(idx as u64) as usize;
            let window = &buffer[start..start + len];
            let strong = strong_checksum(window, self.doc.checksum_bytes);
            if strong != self.doc.blocks[idx].strong {
                debug!(block = idx, "checksum mismatch during verification");
                return Ok(-1);
            }
        }

        *self.verified.lock().await = true;
        Ok(1)
    }

    pub async fn end(&self) -> PathBuf {
        self.scratch_path.lock().await.clone()
    }
}

/// A handle returned by `begin_receive`, through which fetched bytes are
/// delivered into the scratch file (spec §6.3 `receive_data`/`end_receive`).
pub struct Receiver<'a> {
    session: &'a MatchSession,
    content_type: ContentType,
    decompressor: Option<flate2::Decompress>,
    decompressed_cursor: u64,
}

impl<'a> Receiver<'a> {
    /// `buf = None` signals EOF/flush (spec §4.4 step 5).
    pub async fn receive_data(&mut self, buf: Option<&[u8]>, offset: u64) -> Result<()> {
        match self.content_type {
            ContentType::Plain => {
                if let Some(data) = buf {
                    if data.is_empty() {
                        return Ok(());
                    }
                    let mut f = self.session.file.lock().await;
                    f.seek(std::io::SeekFrom::Start(offset)).await?;
                    f.write_all(data).await?;
                    drop(f);

                    let end = offset + data.len() as u64;
                    {
                        let mut cov = self.session.coverage.lock().await;
                        cov.insert(offset, end);
                    }
                    self.mark_newly_complete_blocks().await?;
                }
                Ok(())
            }
            ContentType::Compressed => {
                let decompressor = self.decompressor.as_mut().expect("compressed receiver always has a decompressor");
                if let Some(data) = buf {
                    if data.is_empty() {
                        return Ok(());
                    }
                    let mut out = vec![0u8; data.len() * 4 + 4096];
                    let start_in = decompressor.total_in();
                    let mut consumed = 0usize;
                    loop {
                        let before_out = decompressor.total_out();
                        let status = decompressor
                            .decompress(&data[consumed..], &mut out, flate2::FlushDecompress::None)
                            .map_err(|e| ClientError::ControlFileParseError { reason: format!("gzip decode error: {e}") })?;
                        let produced = decompressor.total_out() - before_out;
                        if produced > 0 {
                            let mut f = self.session.file.lock().await;
                            f.seek(std::io::SeekFrom::Start(self.decompressed_cursor)).await?;
                            f.write_all(&out[..produced as usize]).await?;
                            drop(f);
                            let end = self.decompressed_cursor + produced;
                            {
                                let mut cov = self.session.coverage.lock().await;
                                cov.insert(self.decompressed_cursor, end);
                            }
                            self.decompressed_cursor = end;
                        }
                        consumed = (decompressor.total_in() - start_in) as usize;
                        if status == flate2::Status::StreamEnd || consumed >= data.len() {
                            break;
                        }
                    }
                    self.mark_newly_complete_blocks().await?;
                }
                Ok(())
            }
        }
    }

    async fn mark_newly_complete_blocks(&self) -> Result<()> {
        let cov = self.session.coverage.lock().await;
        let mut states = self.session.block_state.lock().await;
        for idx in 0..states.len() {
            if states[idx] == BlockState::Got {
                continue;
            }
            let start = idx as u64 * self.session.doc.block_size as u64;
            let end = start + self.session.doc.block_len(idx as u64);
            if cov.covers(start, end) {
                states[idx] = BlockState::Got;
            }
        }
        Ok(())
    }

    pub async fn end_receive(self) -> Result<()> {
        Ok(())
    }
}

//! Shared fixtures for the end-to-end scenarios in spec.md §8: a fake
//! in-process `HttpCollaborator` (no real network I/O, matching the pack's
//! convention of testing transport-shaped traits against a mock rather than
//! live HTTP) and a `.zsync`-like control document builder.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use zrsync::http::{HttpCollaborator, RangeBlock, RangeFetchHandle};
use zrsync::matcher::rolling::RollingChecksum;
use zrsync::matcher::strong_checksum;
use zrsync::{ClientError, Result};

pub const BLOCK_SIZE: u32 = 16;
pub const CHECKSUM_BYTES: usize = 8;

/// Builds a control document byte buffer in the format `matcher::control`
/// parses: a text header terminated by a blank line, followed by one
/// `(weak: u32, strong: [u8; CHECKSUM_BYTES])` pair per block.
pub fn build_control_document(target: &[u8], urls: &[&str], z_urls: &[&str], filename: Option<&str>) -> Vec<u8> {
    let mut header = String::new();
    header.push_str("zrsync-control: 1\n");
    header.push_str(&format!("Blocksize: {BLOCK_SIZE}\n"));
    header.push_str(&format!("Length: {}\n", target.len()));
    header.push_str(&format!("Hash-Lengths: {CHECKSUM_BYTES}\n"));
    if let Some(name) = filename {
        header.push_str(&format!("Filename: {name}\n"));
    }
    for u in urls {
        header.push_str(&format!("URL: {u}\n"));
    }
    for u in z_urls {
        header.push_str(&format!("Z-URL: {u}\n"));
    }
    header.push('\n');

    let mut bytes = header.into_bytes();
    let block_size = BLOCK_SIZE as usize;
    let block_count = (target.len() + block_size - 1) / block_size;
    for i in 0..block_count {
        let start = i * block_size;
        let end = (start + block_size).min(target.len());
        let window = &target[start..end];
        let weak = RollingChecksum::new(window).value();
        let strong = strong_checksum(window, CHECKSUM_BYTES);
        bytes.extend_from_slice(&weak.to_le_bytes());
        bytes.extend_from_slice(&strong);
    }
    bytes
}

/// An in-memory HTTP collaborator: `get` and ranged fetches are served
/// straight out of `files`, no sockets involved. URLs listed in
/// `failing_urls` fail every `get_range_block` call on their handle
/// (simulating scenario 4's "URL failover").
pub struct FakeHttpCollaborator {
    files: HashMap<String, Vec<u8>>,
    failing_urls: HashSet<String>,
    chunk_size: usize,
    bytes_served: AtomicU64,
}

impl FakeHttpCollaborator {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            failing_urls: HashSet::new(),
            chunk_size: 7,
            bytes_served: AtomicU64::new(0),
        }
    }

    pub fn serve(mut self, url: &str, content: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), content);
        self
    }

    pub fn fail(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn total_bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl HttpCollaborator for FakeHttpCollaborator {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::ControlFileUnavailable { location: url.to_string() })
    }

    async fn range_fetch_start(&self, url: &str) -> Result<Box<dyn RangeFetchHandle>> {
        if self.failing_urls.contains(url) {
            return Ok(Box::new(FakeRangeFetchHandle {
                content: Vec::new(),
                pending: Vec::new().into(),
                current: None,
                chunk_size: self.chunk_size,
                bytes_down: 0,
                fail: true,
            }));
        }
        let content = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::ControlFileUnavailable { location: url.to_string() })?;
        Ok(Box::new(FakeRangeFetchHandle {
            content,
            pending: Vec::new().into(),
            current: None,
            chunk_size: self.chunk_size,
            bytes_down: 0,
            fail: false,
        }))
    }
}

struct FakeRangeFetchHandle {
    content: Vec<u8>,
    pending: std::collections::VecDeque<(u64, u64)>,
    current: Option<(u64, u64)>, // (cursor, end)
    chunk_size: usize,
    bytes_down: u64,
    fail: bool,
}

#[async_trait]
impl RangeFetchHandle for FakeRangeFetchHandle {
    async fn add_ranges(&mut self, ranges: &[(u64, u64)]) -> Result<()> {
        for &r in ranges {
            self.pending.push_back(r);
        }
        Ok(())
    }

    async fn get_range_block(&mut self) -> Result<RangeBlock> {
        if self.fail {
            return Err(ClientError::Io(std::io::Error::new(std::io::ErrorKind::Other, "simulated network failure")));
        }
        loop {
            if self.current.is_none() {
                match self.pending.pop_front() {
                    Some((start, end)) => self.current = Some((start, end.min(self.content.len() as u64))),
                    None => return Ok(RangeBlock::Eof),
                }
            }
            let (cursor, end) = self.current.unwrap();
            if cursor >= end {
                self.current = None;
                continue;
            }
            let take = (self.chunk_size as u64).min(end - cursor) as usize;
            let data = self.content[cursor as usize..cursor as usize + take].to_vec();
            self.bytes_down += take as u64;
            self.current = Some((cursor + take as u64, end));
            return Ok(RangeBlock::Data { offset: cursor, data });
        }
    }

    fn bytes_down(&self) -> u64 {
        self.bytes_down
    }
}

/// A silent progress collaborator for tests (no terminal, no indicatif).
pub struct NullProgress;

#[async_trait]
impl zrsync::progress::ProgressCollaborator for NullProgress {
    async fn start(&self, _label: &str, _total: Option<u64>) -> Box<dyn zrsync::progress::ProgressHandle> {
        Box::new(NullProgressHandle)
    }
}

struct NullProgressHandle;

#[async_trait]
impl zrsync::progress::ProgressHandle for NullProgressHandle {
    async fn set_position(&mut self, _matched: u64, _total: u64) {}
    async fn finish(&mut self, _message: &str) {}
}

/// A handful of deterministic bytes, long enough to span several blocks.
pub fn sample_target(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub static TEST_MUTEX: Mutex<()> = Mutex::new(());

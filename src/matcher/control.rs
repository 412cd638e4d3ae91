use crate::core::model::ContentType;
use crate::error::{ClientError, Result};

/// A single block's checksum pair: a 4-byte weak rolling checksum and a
/// truncated strong (SHA-256) checksum, `checksum_bytes` long.
#[derive(Debug, Clone)]
pub struct BlockChecksum {
    pub weak: u32,
    pub strong: Vec<u8>,
}

/// The control document (spec §3): opaque to the driver beyond what it
/// needs to plan fetches. Parsed from a text header followed by a binary
/// checksum table, modeled on zsync's `.zsync` format.
#[derive(Debug, Clone)]
pub struct ControlDocument {
    pub block_size: u32,
    pub length: u64,
    pub checksum_bytes: usize,
    pub filename: Option<String>,
    pub mtime: Option<i64>,
    pub hint_decompress: bool,
    pub urls: Vec<String>,
    pub z_urls: Vec<String>,
    pub blocks: Vec<BlockChecksum>,
}

impl ControlDocument {
    pub fn block_count(&self) -> u64 {
        if self.block_size == 0 {
            0
        } else {
            (self.length + self.block_size as u64 - 1) / self.block_size as u64
        }
    }

    /// Length of the final block, which may be shorter than `block_size`.
    pub fn block_len(&self, index: u64) -> u64 {
        let start = index * self.block_size as u64;
        (self.length - start).min(self.block_size as u64)
    }

    /// The run's single candidate URL set (spec §9: multi-type URL sets are
    /// not specified; this document carries exactly one usable set).
    pub fn candidates(&self) -> Result<(Vec<String>, ContentType)> {
        if !self.urls.is_empty() {
            Ok((self.urls.clone(), ContentType::Plain))
        } else if !self.z_urls.is_empty() {
            Ok((self.z_urls.clone(), ContentType::Compressed))
        } else {
            Err(ClientError::ControlFileParseError {
                reason: "control document has no candidate URLs".to_string(),
            })
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let header_end = find_header_end(data).ok_or_else(|| ClientError::ControlFileParseError {
            reason: "no blank line terminating the header".to_string(),
        })?;

        let header = std::str::from_utf8(&data[..header_end]).map_err(|_| {
            ClientError::ControlFileParseError { reason: "header is not valid UTF-8".to_string() }
        })?;
        let body = &data[header_end..];

        let mut block_size: Option<u32> = None;
        let mut length: Option<u64> = None;
        let mut checksum_bytes: Option<usize> = None;
        let mut filename = None;
        let mut mtime = None;
        let mut hint_decompress = false;
        let mut urls = Vec::new();
        let mut z_urls = Vec::new();
        let mut saw_magic = false;

        for line in header.lines() {
            if line.is_empty() {
                continue;
            }
            if !saw_magic {
                if !line.starts_with("zrsync-control:") {
                    return Err(ClientError::ControlFileParseError {
                        reason: "missing zrsync-control magic line".to_string(),
                    });
                }
                saw_magic = true;
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| ClientError::ControlFileParseError {
                reason: format!("malformed header line: {line}"),
            })?;
            let value = value.trim();
            match key {
                "Blocksize" => block_size = value.parse().ok(),
                "Length" => length = value.parse().ok(),
                "Hash-Lengths" => checksum_bytes = value.parse().ok(),
                "Filename" => filename = Some(value.to_string()),
                "MTime" => mtime = value.parse().ok(),
                "Decompress-Seeds" => hint_decompress = value.eq_ignore_ascii_case("yes"),
                "URL" => urls.push(value.to_string()),
                "Z-URL" => z_urls.push(value.to_string()),
                _ => { /* forward-compatible: unknown headers are ignored */ }
            }
        }

        if !saw_magic {
            return Err(ClientError::ControlFileParseError { reason: "empty control document".to_string() });
        }

        let block_size = block_size.ok_or_else(|| ClientError::ControlFileParseError {
            reason: "missing Blocksize".to_string(),
        })?;
        let length = length.ok_or_else(|| ClientError::ControlFileParseError {
            reason: "missing Length".to_string(),
        })?;
        let checksum_bytes = checksum_bytes.ok_or_else(|| ClientError::ControlFileParseError {
            reason: "missing Hash-Lengths".to_string(),
        })?;

        let mut doc = ControlDocument {
            block_size,
            length,
            checksum_bytes,
            filename,
            mtime,
            hint_decompress,
            urls,
            z_urls,
            blocks: Vec::new(),
        };

        let block_count = doc.block_count() as usize;
        let entry_len = 4 + checksum_bytes;
        if body.len() < block_count * entry_len {
            return Err(ClientError::ControlFileParseError {
                reason: "checksum table shorter than Blocksize/Length imply".to_string(),
            });
        }

        let mut blocks = Vec::with_capacity(block_count);
        for i in 0..block_count {
            let off = i * entry_len;
            let weak = u32::from_le_bytes(body[off..off + 4].try_into().unwrap());
            let strong = body[off + 4..off + entry_len].to_vec();
            blocks.push(BlockChecksum { weak, strong });
        }
        doc.blocks = blocks;

        Ok(doc)
    }
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\n\n").map(|p| p + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bytes() -> Vec<u8> {
        let mut s = String::new();
        s.push_str("zrsync-control: 1\n");
        s.push_str("Blocksize: 4\n");
        s.push_str("Length: 9\n");
        s.push_str("Hash-Lengths: 2\n");
        s.push_str("Filename: foo.bin\n");
        s.push_str("URL: http://example.com/foo.bin\n");
        s.push_str("\n");
        let mut bytes = s.into_bytes();
        // 3 blocks (4,4,1 bytes): two checksum entries of 4+2=6 bytes each.
        for _ in 0..3 {
            bytes.extend_from_slice(&0u32.to_le_bytes());
            bytes.extend_from_slice(&[0u8, 0u8]);
        }
        bytes
    }

    #[test]
    fn parses_header_and_table() {
        let doc = ControlDocument::parse(&sample_bytes()).unwrap();
        assert_eq!(doc.block_size, 4);
        assert_eq!(doc.length, 9);
        assert_eq!(doc.block_count(), 3);
        assert_eq!(doc.block_len(2), 1);
        assert_eq!(doc.blocks.len(), 3);
        assert_eq!(doc.filename.as_deref(), Some("foo.bin"));
    }

    #[test]
    fn rejects_missing_magic() {
        let bad = b"Blocksize: 4\n\n".to_vec();
        assert!(ControlDocument::parse(&bad).is_err());
    }

    #[test]
    fn rejects_truncated_table() {
        let mut bytes = sample_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(ControlDocument::parse(&bytes).is_err());
    }
}

use std::io::Read;

use crate::error::{ClientError, Result};

/// In-process gzip decoding (REDESIGN FLAGS: replaces the original's
/// `zcat` subprocess, see `original_source/client.c`'s `open_zcat_pipe`).
/// `flate2` is synchronous, so callers on the async runtime should route
/// through `tokio::task::spawn_blocking`.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|e| ClientError::ControlFileParseError {
        reason: format!("gzip decode error: {e}"),
    })?;
    Ok(out)
}

pub async fn gunzip_async(data: Vec<u8>) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || gunzip(&data))
        .await
        .map_err(|e| ClientError::ControlFileParseError { reason: format!("decompress task panicked: {e}") })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn round_trips_through_flate2_encoder() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello control document").unwrap();
        let compressed = enc.finish().unwrap();
        let out = gunzip(&compressed).unwrap();
        assert_eq!(out, b"hello control document");
    }
}

// src/pipeline/compress.rs

//! Streaming compression of processed result files.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::Result;
use crate::models::compressed_path;
use crate::utils::fs::write_atomically;

/// Bytes read from the source per chunk.
pub const CHUNK_SIZE: usize = 65_000;

/// Compress `source` next to itself and delete the original.
pub fn compress_file(source: &Path) -> Result<PathBuf> {
    compress_file_with(source, CHUNK_SIZE)
}

/// Compress `source` reading `chunk_size` bytes at a time.
///
/// The original is removed only after the compressed copy has been fully
/// written and moved into place.
pub fn compress_file_with(source: &Path, chunk_size: usize) -> Result<PathBuf> {
    let destination = compressed_path(source);
    let mut plain = File::open(source)?;

    write_atomically(&destination, |out| {
        let mut encoder = GzEncoder::new(out, Compression::default());
        let mut chunk = vec![0u8; chunk_size.max(1)];
        loop {
            let read = plain.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            encoder.write_all(&chunk[..read])?;
        }
        encoder.finish()?;
        Ok(())
    })?;

    fs::remove_file(source)?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use tempfile::TempDir;

    fn decompress(path: &Path) -> Vec<u8> {
        let mut decoded = Vec::new();
        GzDecoder::new(File::open(path).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        decoded
    }

    #[test]
    fn round_trip_removes_original() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("E1_20240110");
        let content: Vec<u8> = (0..10_000)
            .flat_map(|i| format!("DARK,data/file_{i}.root\n").into_bytes())
            .collect();
        fs::write(&source, &content).unwrap();

        // Small chunks force many read/write cycles.
        let destination = compress_file_with(&source, 4096).unwrap();

        assert_eq!(destination, tmp.path().join("E1_20240110.gz"));
        assert!(!source.exists());
        assert_eq!(decompress(&destination), content);
    }

    #[test]
    fn empty_file_round_trips() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("E1_20240110");
        fs::write(&source, b"").unwrap();

        let destination = compress_file(&source).unwrap();
        assert!(decompress(&destination).is_empty());
    }

    #[test]
    fn original_kept_when_destination_exists() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("E1_20240110");
        fs::write(&source, b"LOST,a\n").unwrap();
        fs::write(tmp.path().join("E1_20240110.gz"), b"older").unwrap();

        assert!(compress_file(&source).is_err());
        assert_eq!(fs::read(&source).unwrap(), b"LOST,a\n");
    }

    #[test]
    fn missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(compress_file(&tmp.path().join("absent")).is_err());
    }
}

//! A minimal IMGDIFF2 decoder.
//!
//! The on-disk format handled here covers the two chunk kinds that matter
//! for a crash-safe block-device update — a chunk copied verbatim from the
//! patch blob ("raw"), and a chunk produced by diffing against a byte range
//! of the source image ("normal", carrying an embedded BSDIFF40 patch) —
//! and treats them as opaque, pre-built records rather than something this
//! crate recompresses or re-diffs itself:
//!
//! ```text
//! offset 0:  8 bytes   magic "IMGDIFF2"
//! offset 8:  u32 LE    chunk_count
//! offset 12: chunk_count * 36-byte records:
//!     u32 LE   chunk_type      (0 = normal, 1 = raw)
//!     u64 LE   a               (normal: source_offset : raw: unused, 0)
//!     u64 LE   b               (normal: source_len    : raw: unused, 0)
//!     u64 LE   payload_offset  (absolute offset into this blob)
//!     u64 LE   payload_len
//! ```
//! A normal chunk's payload is itself a complete `BSDIFF40` patch applied
//! against `source[a..a+b]`; a raw chunk's payload is copied to the sink as
//! is. Deflate-recompressed chunks, part of the on-device image format this
//! was modeled on, are out of scope here and rejected with
//! [`DecodeError::Imgdiff2`].

use super::bsdiff40::Bsdiff40Decoder;
use super::{DecodeError, PatchDecoder};
use crate::sink::{MemorySink, Sink};

pub const MAGIC: &[u8; 8] = b"IMGDIFF2";

const HEADER_LEN: usize = 12;
const RECORD_LEN: usize = 36;

const CHUNK_NORMAL: u32 = 0;
const CHUNK_RAW: u32 = 1;

pub struct ImgDiff2Decoder;

impl PatchDecoder for ImgDiff2Decoder {
    fn apply(&self, source: &[u8], patch: &[u8], sink: &mut dyn Sink) -> Result<(), DecodeError> {
        if patch.len() < HEADER_LEN {
            return Err(DecodeError::Imgdiff2("patch shorter than header".into()));
        }
        let chunk_count = read_u32(patch, 8) as usize;
        let records_end = HEADER_LEN + chunk_count * RECORD_LEN;
        if patch.len() < records_end {
            return Err(DecodeError::Imgdiff2("truncated chunk table".into()));
        }

        for i in 0..chunk_count {
            let record = &patch[HEADER_LEN + i * RECORD_LEN..HEADER_LEN + (i + 1) * RECORD_LEN];
            let chunk_type = read_u32(record, 0);
            let a = read_u64(record, 4);
            let b = read_u64(record, 12);
            let payload_offset = read_u64(record, 20) as usize;
            let payload_len = read_u64(record, 28) as usize;

            let payload_end = payload_offset
                .checked_add(payload_len)
                .ok_or_else(|| DecodeError::Imgdiff2(format!("chunk {i} payload range overflows")))?;
            let payload = patch
                .get(payload_offset..payload_end)
                .ok_or_else(|| DecodeError::Imgdiff2(format!("chunk {i} payload out of range")))?;

            match chunk_type {
                CHUNK_RAW => sink.write(payload)?,
                CHUNK_NORMAL => {
                    let source_start = a as usize;
                    let source_end = source_start
                        .checked_add(b as usize)
                        .ok_or_else(|| DecodeError::Imgdiff2(format!("chunk {i} source range overflows")))?;
                    let chunk_source = source.get(source_start..source_end).ok_or_else(|| {
                        DecodeError::Imgdiff2(format!("chunk {i} source range out of range"))
                    })?;
                    let mut chunk_sink = MemorySink::with_capacity(estimate_target_len(payload)?);
                    Bsdiff40Decoder.apply(chunk_source, payload, &mut chunk_sink)?;
                    sink.write(&chunk_sink.into_written())?;
                }
                other => {
                    return Err(DecodeError::Imgdiff2(format!(
                        "chunk {i} has unsupported type {other}"
                    )))
                }
            }
        }

        Ok(())
    }
}

fn estimate_target_len(bsdiff_patch: &[u8]) -> Result<usize, DecodeError> {
    qbsdiff::Bspatch::new(bsdiff_patch)
        .map(|p| p.hint_target_size() as usize)
        .map_err(|e| DecodeError::Imgdiff2(e.to_string()))
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_header() {
        let mut sink = MemorySink::with_capacity(0);
        let err = ImgDiff2Decoder.apply(b"", b"IMGDIF", &mut sink);
        assert!(err.is_err());
    }

    #[test]
    fn raw_chunk_copies_through() {
        let payload = b"hello world";
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&(CHUNK_RAW).to_le_bytes());
        patch.extend_from_slice(&0u64.to_le_bytes());
        patch.extend_from_slice(&0u64.to_le_bytes());
        patch.extend_from_slice(&(HEADER_LEN as u64 + RECORD_LEN as u64).to_le_bytes());
        patch.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        patch.extend_from_slice(payload);

        let mut sink = MemorySink::with_capacity(payload.len());
        ImgDiff2Decoder.apply(b"", &patch, &mut sink).unwrap();
        assert_eq!(sink.into_written(), payload);
    }

    #[test]
    fn rejects_unsupported_chunk_type() {
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&2u32.to_le_bytes());
        patch.extend_from_slice(&[0u8; 28]);

        let mut sink = MemorySink::with_capacity(0);
        assert!(ImgDiff2Decoder.apply(b"", &patch, &mut sink).is_err());
    }

    #[test]
    fn rejects_payload_range_that_would_overflow() {
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&(CHUNK_RAW).to_le_bytes());
        patch.extend_from_slice(&0u64.to_le_bytes());
        patch.extend_from_slice(&0u64.to_le_bytes());
        patch.extend_from_slice(&u64::MAX.to_le_bytes());
        patch.extend_from_slice(&u64::MAX.to_le_bytes());

        let mut sink = MemorySink::with_capacity(0);
        let err = ImgDiff2Decoder.apply(b"", &patch, &mut sink).unwrap_err();
        assert!(matches!(err, DecodeError::Imgdiff2(_)));
    }

    #[test]
    fn rejects_source_range_that_would_overflow() {
        let mut patch = Vec::new();
        patch.extend_from_slice(MAGIC);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&(CHUNK_NORMAL).to_le_bytes());
        patch.extend_from_slice(&u64::MAX.to_le_bytes());
        patch.extend_from_slice(&u64::MAX.to_le_bytes());
        patch.extend_from_slice(&(HEADER_LEN as u64 + RECORD_LEN as u64).to_le_bytes());
        patch.extend_from_slice(&0u64.to_le_bytes());

        let mut sink = MemorySink::with_capacity(0);
        let err = ImgDiff2Decoder.apply(b"source", &patch, &mut sink).unwrap_err();
        assert!(matches!(err, DecodeError::Imgdiff2(_)));
    }
}

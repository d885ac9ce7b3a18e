//! BSDIFF40 decoding via the real bsdiff-4.x-compatible `qbsdiff` crate.

use super::{DecodeError, PatchDecoder};
use crate::sink::Sink;

pub const MAGIC: &[u8; 8] = b"BSDIFF40";

pub struct Bsdiff40Decoder;

impl PatchDecoder for Bsdiff40Decoder {
    fn apply(&self, source: &[u8], patch: &[u8], sink: &mut dyn Sink) -> Result<(), DecodeError> {
        let patcher =
            qbsdiff::Bspatch::new(patch).map_err(|e| DecodeError::Bsdiff40(e.to_string()))?;

        let mut output = Vec::with_capacity(patcher.hint_target_size() as usize);
        patcher
            .apply(source, &mut output)
            .map_err(|e| DecodeError::Bsdiff40(e.to_string()))?;

        sink.write(&output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_patch_without_valid_header() {
        let mut sink = crate::sink::MemorySink::with_capacity(16);
        let decoder = Bsdiff40Decoder;
        let err = decoder.apply(b"source", b"BSDIFF40notarealheader", &mut sink);
        assert!(err.is_err());
    }
}

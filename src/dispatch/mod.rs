//! Patch-format dispatch: identify a patch blob by its 8-byte magic and hand
//! it to the matching decoder. Decoders are opaque collaborators here — this
//! module only knows how to recognize a format and route to it.

use crate::sink::Sink;

mod bsdiff40;
mod imgdiff2;

pub const MAGIC_LEN: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("patch blob is shorter than the {MAGIC_LEN}-byte magic")]
    TooShort,
    #[error("unrecognized patch format magic {0:?}")]
    UnknownMagic([u8; MAGIC_LEN]),
    #[error("bsdiff40 decode failed: {0}")]
    Bsdiff40(String),
    #[error("imgdiff2 decode failed: {0}")]
    Imgdiff2(String),
    #[error("decoder output write failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// A format-specific patch decoder: apply a patch to `source`, streaming
/// output through `sink`. Decoders trust their own internal integrity
/// checks (e.g. bzip2 stream CRCs); verifying the *result* against an
/// expected hash is the caller's job, not the decoder's.
pub trait PatchDecoder {
    fn apply(&self, source: &[u8], patch: &[u8], sink: &mut dyn Sink) -> Result<(), DecodeError>;
}

/// Recognize `patch`'s magic and apply it to `source` through `sink`.
pub fn dispatch(source: &[u8], patch: &[u8], sink: &mut dyn Sink) -> Result<(), DecodeError> {
    if patch.len() < MAGIC_LEN {
        return Err(DecodeError::TooShort);
    }
    let magic: [u8; MAGIC_LEN] = patch[..MAGIC_LEN].try_into().unwrap();

    let decoder: &dyn PatchDecoder = match &magic {
        bsdiff40::MAGIC => &bsdiff40::Bsdiff40Decoder,
        imgdiff2::MAGIC => &imgdiff2::ImgDiff2Decoder,
        _ => return Err(DecodeError::UnknownMagic(magic)),
    };
    decoder.apply(source, patch, sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    #[test]
    fn rejects_short_patch() {
        let mut sink = MemorySink::with_capacity(0);
        let err = dispatch(b"", b"short", &mut sink).unwrap_err();
        assert!(matches!(err, DecodeError::TooShort));
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut sink = MemorySink::with_capacity(0);
        let err = dispatch(b"", b"NOTAPTCH", &mut sink).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownMagic(_)));
    }
}

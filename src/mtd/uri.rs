//! The `MTD:<partition>:<size_1>:<sha1_1>:<size_2>:<sha1_2>:...` naming
//! grammar used for both probe sources and write targets.

use crate::hash::{parse_sha1, ParseSha1Error, Sha1Digest};

const MTD_PREFIX: &str = "MTD:";

/// Whether `name` is an MTD name *at all* — read-probe or write-target
/// grammar, valid or not. Used where callers need to distinguish "names a
/// raw flash partition" from "names a filesystem path" without committing
/// to parsing either grammar's fields (e.g. the engine's space protocol,
/// which cares only whether the source or target is a partition, not
/// whether the probe candidate list happens to be well-formed).
pub fn is_mtd_name(name: &str) -> bool {
    name.starts_with(MTD_PREFIX)
}

#[derive(thiserror::Error, Debug)]
pub enum MtdUriError {
    #[error("mtd uri has no partition name")]
    EmptyPartition,
    #[error("mtd uri has an odd number of size/hash fields")]
    UnpairedField,
    #[error("mtd uri names no size/hash candidates")]
    NoCandidates,
    #[error("mtd uri candidate size must be nonzero")]
    ZeroSize,
    #[error("mtd uri candidate size \"{0}\" is not a valid number")]
    BadSize(String),
    #[error("mtd uri candidate hash is malformed: {0}")]
    BadHash(#[from] ParseSha1Error),
}

/// A parsed probe URI: a partition name plus an ordered list of
/// `(size, expected_sha1)` candidates, as they appeared in the string (callers
/// that need ascending order, e.g. [`crate::mtd::probe`], sort explicitly).
#[derive(Debug, Clone)]
pub struct MtdUri {
    pub partition: String,
    pub candidates: Vec<(u64, Sha1Digest)>,
}

impl MtdUri {
    /// Parse a full `MTD:...` probe URI. Every field after the partition name
    /// must pair into `(size, sha1)`; a lone trailing field, a zero size, or
    /// an unparseable size/hash is a hard error rather than a candidate that
    /// is silently dropped.
    pub fn parse(name: &str) -> Result<Self, MtdUriError> {
        let rest = name.strip_prefix(MTD_PREFIX).ok_or(MtdUriError::EmptyPartition)?;
        let mut fields = rest.split(':');

        let partition = fields.next().unwrap_or("").to_string();
        if partition.is_empty() {
            return Err(MtdUriError::EmptyPartition);
        }

        let mut candidates = Vec::new();
        loop {
            let size_field = match fields.next() {
                Some(f) => f,
                None => break,
            };
            let hash_field = fields.next().ok_or(MtdUriError::UnpairedField)?;

            let size: u64 = size_field
                .parse()
                .map_err(|_| MtdUriError::BadSize(size_field.to_string()))?;
            if size == 0 {
                return Err(MtdUriError::ZeroSize);
            }
            let hash = parse_sha1(hash_field)?;
            candidates.push((size, hash));
        }

        if candidates.is_empty() {
            return Err(MtdUriError::NoCandidates);
        }

        Ok(Self { partition, candidates })
    }

    /// Best-effort recognizer used by [`crate::content::load`] to decide
    /// whether a name is an MTD URI at all. Returns `None` (not an error) for
    /// anything not starting with `"MTD:"`; a malformed `"MTD:"` string still
    /// propagates as `None` here — the hard parse error only fires for
    /// callers that have already committed to treating the name as MTD (this
    /// module's own [`MtdUri::parse`] and [`extract_write_partition`]).
    pub fn parse_opt(name: &str) -> Option<Self> {
        if !name.starts_with(MTD_PREFIX) {
            return None;
        }
        Self::parse(name).ok()
    }
}

/// Extract the partition name from an MTD write-target URI
/// (`"MTD:" partition (":" anything)*`). Unlike the probe grammar, a write
/// target's trailing fields are not validated as size/hash pairs — only the
/// partition name is meaningful.
pub fn extract_write_partition(target_uri: &str) -> Result<String, MtdUriError> {
    let rest = target_uri
        .strip_prefix(MTD_PREFIX)
        .ok_or(MtdUriError::EmptyPartition)?;
    let partition = rest.split(':').next().unwrap_or("");
    if partition.is_empty() {
        return Err(MtdUriError::EmptyPartition);
    }
    Ok(partition.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_candidate() {
        let hash = "a".repeat(40);
        let uri = MtdUri::parse(&format!("MTD:boot:1024:{hash}")).unwrap();
        assert_eq!(uri.partition, "boot");
        assert_eq!(uri.candidates.len(), 1);
        assert_eq!(uri.candidates[0].0, 1024);
    }

    #[test]
    fn parses_multiple_candidates() {
        let h1 = "a".repeat(40);
        let h2 = "b".repeat(40);
        let uri = MtdUri::parse(&format!("MTD:boot:1024:{h1}:2048:{h2}")).unwrap();
        assert_eq!(uri.candidates.len(), 2);
    }

    #[test]
    fn rejects_unpaired_trailing_field() {
        let h1 = "a".repeat(40);
        assert!(MtdUri::parse(&format!("MTD:boot:1024:{h1}:2048")).is_err());
    }

    #[test]
    fn rejects_zero_size() {
        let h1 = "a".repeat(40);
        assert!(MtdUri::parse(&format!("MTD:boot:0:{h1}")).is_err());
    }

    #[test]
    fn rejects_empty_partition() {
        let h1 = "a".repeat(40);
        assert!(MtdUri::parse(&format!("MTD::1024:{h1}")).is_err());
    }

    #[test]
    fn parse_opt_returns_none_for_non_mtd_names() {
        assert!(MtdUri::parse_opt("/data/local/some.file").is_none());
    }

    #[test]
    fn write_target_ignores_trailing_fields() {
        assert_eq!(
            extract_write_partition("MTD:system:whatever:else").unwrap(),
            "system"
        );
    }
}

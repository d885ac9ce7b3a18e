//! SHA-1 digest codec — parsing, formatting, and incremental hashing.
//!
//! # Grammar
//! A digest string is exactly 40 hex characters (case-insensitive), optionally
//! followed by `:` and an arbitrary, ignored suffix. This lets patch-key
//! strings carry annotations (e.g. `<sha1>:some/annotation`) without the
//! parser caring what follows the colon.

use std::fmt;
use std::str::FromStr;

use sha1::{Digest, Sha1};

/// Byte length of a SHA-1 digest.
pub const SHA1_DIGEST_LEN: usize = 20;

/// A parsed 20-byte SHA-1 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha1Digest(pub [u8; SHA1_DIGEST_LEN]);

impl Sha1Digest {
    #[inline]
    pub fn as_bytes(&self) -> &[u8; SHA1_DIGEST_LEN] {
        &self.0
    }

    /// Digest of `data`, computed in one shot.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }
}

impl fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Sha1Digest {
    type Err = ParseSha1Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_sha1(s)
    }
}

/// Error parsing a hex SHA-1 string.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("malformed SHA-1 hex string")]
pub struct ParseSha1Error;

/// Parse exactly 40 hex digits, tolerating a trailing `:<anything>`.
///
/// No allocation. Any character at position 40 other than end-of-string or
/// `:` is an error; any non-hex character in the first 40 positions is an
/// error.
pub fn parse_sha1(s: &str) -> Result<Sha1Digest, ParseSha1Error> {
    let bytes = s.as_bytes();
    if bytes.len() < SHA1_DIGEST_LEN * 2 {
        return Err(ParseSha1Error);
    }
    let mut digest = [0u8; SHA1_DIGEST_LEN];
    for i in 0..SHA1_DIGEST_LEN {
        let hi = hex_digit(bytes[i * 2])?;
        let lo = hex_digit(bytes[i * 2 + 1])?;
        digest[i] = (hi << 4) | lo;
    }
    match bytes.get(SHA1_DIGEST_LEN * 2) {
        None | Some(b':') => Ok(Sha1Digest(digest)),
        Some(_) => Err(ParseSha1Error),
    }
}

#[inline]
fn hex_digit(b: u8) -> Result<u8, ParseSha1Error> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(ParseSha1Error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex() {
        let digest = Sha1Digest::of(b"hello\n");
        let hex = digest.to_string();
        assert_eq!(parse_sha1(&hex).unwrap(), digest);
    }

    #[test]
    fn tolerates_trailing_annotation() {
        let digest = Sha1Digest::of(b"hello\n");
        let annotated = format!("{digest}:some/annotation");
        assert_eq!(parse_sha1(&annotated).unwrap(), digest);
    }

    #[test]
    fn rejects_bad_41st_character() {
        let digest = Sha1Digest::of(b"hello\n");
        let bad = format!("{digest}x");
        assert!(parse_sha1(&bad).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(parse_sha1(&"g".repeat(40)).is_err());
    }

    #[test]
    fn known_vector() {
        // sha1("hello\n") = f572d396fae9206628714fb2ce00f72e94f2258d
        let digest = Sha1Digest::of(b"hello\n");
        assert_eq!(digest.to_string(), "f572d396fae9206628714fb2ce00f72e94f2258d");
    }

    proptest::proptest! {
        #[test]
        fn hash_round_trip(data: Vec<u8>) {
            let digest = Sha1Digest::of(&data);
            let hex = digest.to_string();
            proptest::prop_assert_eq!(parse_sha1(&hex).unwrap(), digest);
            let annotated = format!("{hex}:x");
            proptest::prop_assert_eq!(parse_sha1(&annotated).unwrap(), digest);
        }
    }
}

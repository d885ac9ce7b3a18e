//! # otapatch — crash-safe, hash-verified binary patch application
//!
//! Given a source (a plain file, or a raw flash partition named by an
//! `MTD:` URI), a set of candidate patches keyed by the source hash each
//! was built against, and the expected hash and size of the result, this
//! crate identifies which patch applies, decodes it (BSDIFF40 or IMGDIFF2),
//! verifies the output, and commits it to the target — atomically via
//! `rename` on a filesystem, or via an erase-then-write pass on raw flash
//! backed by a recovery copy in `/cache`.
//!
//! Applying the same update twice is a no-op: [`engine::apply`] checks
//! whether the target already matches before doing any work.

pub mod check;
pub mod config;
pub mod content;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod hash;
pub mod mtd;
pub mod sink;
pub mod space;

// Flat re-exports for the most common types.
pub use check::{check, CheckError};
pub use content::{load, save, ContentError, FileContents};
pub use engine::{apply, EngineError, PatchBlob, PatchValue, UpdateRequest, ValueTag};
pub use error::OtaPatchError;
pub use hash::{parse_sha1, ParseSha1Error, Sha1Digest};
pub use mtd::{FsMtdDevice, MtdDevice, MtdError, MtdUri};
pub use sink::{FileSink, MemorySink, Sink};
pub use space::{CacheEvictor, NoEviction, SpaceError};

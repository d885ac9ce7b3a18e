//! Top-level error type composing every module's error enum, the way a
//! binary entry point wants a single `?`-able type without each module
//! needing to know about the others.

use crate::check::CheckError;
use crate::content::ContentError;
use crate::engine::EngineError;
use crate::hash::ParseSha1Error;
use crate::mtd::MtdError;

#[derive(thiserror::Error, Debug)]
pub enum OtaPatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error(transparent)]
    Content(#[from] ContentError),
    #[error(transparent)]
    Mtd(#[from] MtdError),
    #[error(transparent)]
    ParseSha1(#[from] ParseSha1Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

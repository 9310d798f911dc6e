//! Shared data structures for the analysis pipeline
//!
//! - `EntityKind` / `Record`: raw input as handed over by collaborators
//! - `Snapshot`: bounded, immutable input of one analysis pass
//! - `AnalysisDocument`: validated output of one analysis pass
//! - `ProviderCall`: request/response record of a (possibly retried) dispatch

mod call;
mod document;
mod entity;
mod snapshot;

pub use call::*;
pub use document::*;
pub use entity::*;
pub use snapshot::*;

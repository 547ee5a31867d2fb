//! Domain identifiers (strongly-typed IDs).
//!
//! Job and generation ids come from the dispatch source and are opaque
//! strings (usually UUIDs). The phantom marker keeps a `JobId` from being
//! passed where a `GenerationId` is expected.
//!
//! Ids minted locally (see [`crate::ports::IdGenerator`]) are ULIDs with a
//! marker prefix, so they sort by creation time and are easy to spot in logs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker provides the prefix used for locally minted ids.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id type.
///
/// `T` only exists at compile time; the value is a plain string on the wire.
///
/// ```ignore
/// let job_id = JobId::new("a5ef...");
/// let generation_id = GenerationId::new("a5ef...");
/// // job_id と generation_id は異なる型なので、混同できない
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap an id issued by the dispatch source.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Build a prefixed id from a ULID (`job-01H...`).
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Job のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

/// Generation のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Generation {}

impl IdMarker for Generation {
    fn prefix() -> &'static str {
        "gen-"
    }
}

/// Identifier of a popped job (the unit tracked by the state machine).
pub type JobId = Id<Job>;

/// Identifier of one generation inside a job's batch.
pub type GenerationId = Id<Generation>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::fingerprint::Fingerprint;

/// A derived artifact together with the fingerprint it was generated against
///
/// Fingerprint and value are always written together; there is no way to
/// update one without the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<V> {
    pub key: String,
    pub fingerprint: Fingerprint,
    pub value: V,
    /// Informational only, never used for expiry
    pub stored_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(key: impl Into<String>, fingerprint: Fingerprint, value: V) -> Self {
        Self {
            key: key.into(),
            fingerprint,
            value,
            stored_at: Utc::now(),
        }
    }

    /// Whether this entry certifies the given fingerprint
    pub fn matches(&self, fingerprint: &Fingerprint) -> bool {
        &self.fingerprint == fingerprint
    }
}

/// Outcome of a single `resolve` call
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<V> {
    /// The collection was empty; nothing was generated or read
    Empty,
    /// The stored entry matched the current fingerprint
    Hit { value: V },
    /// A fresh value was generated and committed to the store
    MissResolved { value: V },
    /// The generator failed; the store was left untouched
    MissFailed {
        error: GenerationError,
        stale: Option<V>,
    },
    /// A generation for this fingerprint is already running and the caller
    /// asked not to wait for it
    Pending { stale: Option<V> },
    /// Generation succeeded, but a newer fingerprint was requested for the key
    /// in the meantime, so the value was not stored
    Superseded { value: V },
    /// The collection could not be fingerprinted, so a value was generated
    /// but neither looked up nor stored
    Uncached { value: V },
}

impl<V> Resolution<V> {
    /// The freshest value this resolution can offer, stale or not
    pub fn value(&self) -> Option<&V> {
        match self {
            Resolution::Hit { value }
            | Resolution::MissResolved { value }
            | Resolution::Superseded { value }
            | Resolution::Uncached { value } => Some(value),
            Resolution::MissFailed { stale, .. } | Resolution::Pending { stale } => stale.as_ref(),
            Resolution::Empty => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Resolution::Hit { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Resolution::MissFailed { .. })
    }

    /// Short status label, as used in logs and CLI output
    pub fn status(&self) -> &'static str {
        match self {
            Resolution::Empty => "empty",
            Resolution::Hit { .. } => "hit",
            Resolution::MissResolved { .. } => "miss-resolved",
            Resolution::MissFailed { .. } => "miss-failed",
            Resolution::Pending { .. } => "pending",
            Resolution::Superseded { .. } => "superseded",
            Resolution::Uncached { .. } => "uncached",
        }
    }
}

/// What a caller wants when the same generation is already in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingPolicy {
    /// Wait for the in-flight generation and share its result
    #[default]
    Await,
    /// Return the previously stored value immediately
    Stale,
}

/// Failure reported by the generator collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("generation failed: {0}")]
    Failed(String),

    #[error("generation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("malformed generator output: {0}")]
    Malformed(String),
}

impl From<anyhow::Error> for GenerationError {
    fn from(err: anyhow::Error) -> Self {
        // Generators may raise a typed GenerationError through anyhow
        match err.downcast::<GenerationError>() {
            Ok(typed) => typed,
            Err(other) => GenerationError::Failed(format!("{:#}", other)),
        }
    }
}

/// Errors raised by key-value backends and codecs
///
/// These never cross the `CacheStore` boundary; they are logged and absorbed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt entry for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// Canonical text of a projected collection
///
/// Two collections have equal fingerprints exactly when their projections
/// serialize to the same canonical JSON, so comparison has no false negatives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint `items` through `projection`
    ///
    /// Fails if any item cannot be projected; there is no placeholder value
    /// that would keep distinct collections apart.
    pub fn compute<I, P>(items: &[I], projection: &P) -> Result<Self, serde_json::Error>
    where
        P: Projection<I> + ?Sized,
    {
        let projected = items
            .iter()
            .map(|item| projection.project(item).map(canonicalize))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fingerprint(Value::Array(projected).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SHA-256 hex digest, for display and file naming
    pub fn digest(&self) -> String {
        digest_hex(self.0.as_bytes())
    }

    /// First 12 hex characters of the digest
    pub fn short(&self) -> String {
        self.digest()[..12].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Restriction of an item to the fields that affect a derived artifact
pub trait Projection<I>: Send + Sync {
    fn project(&self, item: &I) -> Result<Value, serde_json::Error>;
}

impl<I, F> Projection<I> for F
where
    F: Fn(&I) -> Value + Send + Sync,
{
    fn project(&self, item: &I) -> Result<Value, serde_json::Error> {
        Ok(self(item))
    }
}

/// Projects the whole serialized item
#[derive(Debug, Clone, Copy, Default)]
pub struct FullProjection;

impl<I: Serialize> Projection<I> for FullProjection {
    fn project(&self, item: &I) -> Result<Value, serde_json::Error> {
        serde_json::to_value(item)
    }
}

/// Rebuild objects with keys in sorted order, recursively
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (name, field) in fields {
                sorted.insert(name, canonicalize(field));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

pub(crate) fn digest_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{CacheEntry, StoreError};

/// Upper bound on the decompressed size a compact entry may claim
const MAX_COMPACT_ENTRY_BYTES: usize = 16 * 1024 * 1024;

/// On-disk (or in-backend) representation of a cache entry
///
/// Every variant encodes the whole entry as one value, so fingerprint and
/// artifact are always replaced together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// `{"key", "fingerprint", "value", "storedAt"}` as UTF-8 JSON
    #[default]
    Json,
    /// bincode, LZ4 block compressed with the size prepended
    Compact,
}

impl Encoding {
    pub fn encode<V: Serialize>(&self, entry: &CacheEntry<V>) -> Result<Vec<u8>, StoreError> {
        match self {
            Encoding::Json => {
                serde_json::to_vec(entry).map_err(|e| StoreError::Codec(e.to_string()))
            }
            Encoding::Compact => {
                let serialized =
                    bincode::serialize(entry).map_err(|e| StoreError::Codec(e.to_string()))?;
                Ok(lz4::block::compress(&serialized, None, true)?)
            }
        }
    }

    /// Decode an entry; any failure means the stored bytes are corrupt
    pub fn decode<V: DeserializeOwned>(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> Result<CacheEntry<V>, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        };

        match self {
            Encoding::Json => serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string())),
            Encoding::Compact => {
                // The size prefix is untrusted; check it before lz4 allocates
                let prefix: [u8; 4] = bytes
                    .get(..4)
                    .and_then(|head| head.try_into().ok())
                    .ok_or_else(|| corrupt("truncated size prefix".to_string()))?;
                let claimed = i32::from_le_bytes(prefix);
                if claimed < 0 || claimed as usize > MAX_COMPACT_ENTRY_BYTES {
                    return Err(corrupt(format!("implausible size prefix {}", claimed)));
                }
                let decompressed =
                    lz4::block::decompress(bytes, None).map_err(|e| corrupt(e.to_string()))?;
                bincode::deserialize(&decompressed).map_err(|e| corrupt(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::Fingerprint;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn entry() -> CacheEntry<String> {
        let items = vec![1u32, 2];
        let fp = Fingerprint::compute(&items, &|n: &u32| json!({ "id": n })).unwrap();
        CacheEntry::new("insight", fp, "Focus on item 1.".to_string())
    }

    #[test]
    fn test_json_layout_folds_fingerprint_into_one_object() {
        let bytes = Encoding::Json.encode(&entry()).unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(raw["key"], json!("insight"));
        assert_eq!(raw["fingerprint"], json!(r#"[{"id":1},{"id":2}]"#));
        assert_eq!(raw["value"], json!("Focus on item 1."));
        assert!(raw["storedAt"].is_string());
    }

    #[test]
    fn test_compact_decodes_what_it_encodes() {
        let original = entry();
        let bytes = Encoding::Compact.encode(&original).unwrap();
        let decoded: CacheEntry<String> = Encoding::Compact.decode("insight", &bytes).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_garbage_is_reported_as_corrupt() {
        for encoding in [Encoding::Json, Encoding::Compact] {
            let result: Result<CacheEntry<String>, _> = encoding.decode("insight", b"{not json");
            assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        }
    }

    #[test]
    fn test_wrong_shape_is_reported_as_corrupt() {
        let result: Result<CacheEntry<String>, _> =
            Encoding::Json.decode("insight", br#"{"fingerprint": 7}"#);
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    }
}

//! # Statistics File Format
//!
//! Binary header + JSON payload for persisted symbol statistics.
//!
//! File I/O lives in [`crate::storage`]; this module only converts between
//! bytes and values.
//!
//! Format: Header (32 bytes) + compact JSON object.
//! - 4 bytes: Magic ("rsc2")
//! - 1 byte: Version
//! - 3 bytes: Padding (zero)
//! - 4 bytes: Number of entries (u32, little-endian)
//! - 20 bytes: Reserved (zero)
//!
//! The payload maps each symbol name to
//! `{"weight", "time", "count", "frequency": {"avg", "stddev"}}`.
//! Readers accept any key order and ignore keys they do not know.

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_STATS_FILE_SIZE, STATS_HEADER_SIZE};
use crate::stats::{ItemStats, round_to_hundreds};
use crate::types::SymcacheError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding the statistics payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub nitems: u32,
}

impl StatsHeader {
    /// Create a header with the current format version.
    #[must_use]
    pub fn new(nitems: u32) -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
            nitems,
        }
    }

    /// Validate magic bytes and version.
    pub fn validate(&self, path: &Path) -> Result<(), SymcacheError> {
        if &self.magic != MAGIC_BYTES {
            return Err(SymcacheError::BadMagic {
                path: path.to_path_buf(),
            });
        }
        if self.version != FORMAT_VERSION {
            return Err(SymcacheError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: self.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(())
    }

    /// Write header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; STATS_HEADER_SIZE] {
        let mut bytes = [0u8; STATS_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes[8..12].copy_from_slice(&self.nitems.to_le_bytes());
        bytes
    }

    /// Read header from bytes. Returns `None` if fewer than
    /// `STATS_HEADER_SIZE` bytes are given.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..STATS_HEADER_SIZE)?;
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        let mut nitems = [0u8; 4];
        nitems.copy_from_slice(&header[8..12]);
        Some(Self {
            magic,
            version: header[4],
            nitems: u32::from_le_bytes(nitems),
        })
    }
}

// =============================================================================
// PAYLOAD RECORDS
// =============================================================================

/// Frequency sub-record of a persisted entry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedFrequency {
    pub avg: f64,
    pub stddev: f64,
}

/// Record written for each symbol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedStats {
    pub weight: f64,
    pub time: f64,
    pub count: u64,
    pub frequency: PersistedFrequency,
}

impl PersistedStats {
    /// Snapshot of live statistics, rounded to two decimals.
    #[must_use]
    pub fn from_stats(stats: &ItemStats) -> Self {
        Self {
            weight: round_to_hundreds(stats.weight),
            time: round_to_hundreds(stats.avg_time),
            count: stats.total_hits,
            frequency: PersistedFrequency {
                avg: round_to_hundreds(stats.avg_frequency),
                stddev: round_to_hundreds(stats.stddev_frequency),
            },
        }
    }
}

/// Record read back for each symbol. Absent or mistyped fields are `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PersistedEntry {
    pub weight: Option<f64>,
    pub time: Option<f64>,
    pub count: Option<u64>,
    pub frequency_avg: Option<f64>,
    pub frequency_stddev: Option<f64>,
}

impl PersistedEntry {
    /// Extract an entry from a JSON value; `None` unless it is an object.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let frequency = obj.get("frequency").and_then(Value::as_object);
        Some(Self {
            weight: obj.get("weight").and_then(Value::as_f64),
            time: obj.get("time").and_then(Value::as_f64),
            count: obj.get("count").and_then(value_to_count),
            frequency_avg: frequency.and_then(|f| f.get("avg")).and_then(Value::as_f64),
            frequency_stddev: frequency
                .and_then(|f| f.get("stddev"))
                .and_then(Value::as_f64),
        })
    }
}

fn value_to_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f as u64)
    })
}

/// Decoded statistics file: symbol name → entry.
pub type StatsSnapshot = BTreeMap<String, PersistedEntry>;

// =============================================================================
// ENCODING / DECODING
// =============================================================================

/// Encode a statistics file (header + compact JSON payload).
pub fn stats_to_bytes(entries: &BTreeMap<String, PersistedStats>) -> Result<Vec<u8>, SymcacheError> {
    let nitems = u32::try_from(entries.len())
        .map_err(|_| SymcacheError::Payload("too many entries".to_string()))?;
    let header = StatsHeader::new(nitems);
    let payload =
        serde_json::to_vec(entries).map_err(|e| SymcacheError::Payload(e.to_string()))?;

    let mut result = Vec::with_capacity(STATS_HEADER_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Decode a statistics file. `path` is only used to attribute errors.
///
/// Size and header are validated before the payload is parsed; entries that
/// are not objects are skipped.
pub fn stats_from_bytes(bytes: &[u8], path: &Path) -> Result<StatsSnapshot, SymcacheError> {
    if bytes.len() > MAX_STATS_FILE_SIZE {
        return Err(SymcacheError::Payload(format!(
            "file size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_STATS_FILE_SIZE
        )));
    }

    let header = StatsHeader::from_bytes(bytes).ok_or_else(|| SymcacheError::Truncated {
        path: path.to_path_buf(),
        size: bytes.len(),
    })?;
    header.validate(path)?;

    let payload = &bytes[STATS_HEADER_SIZE..];
    let top: Value = serde_json::from_slice(payload)
        .map_err(|e| SymcacheError::Payload(format!("cannot parse {:?}: {}", path, e)))?;

    let Value::Object(top) = top else {
        return Err(SymcacheError::Payload(format!("cannot use {:?}, bad object", path)));
    };

    Ok(top
        .iter()
        .filter_map(|(name, value)| {
            PersistedEntry::from_value(value).map(|entry| (name.clone(), entry))
        })
        .collect())
}

// =============================================================================
// TESTS
// =============================================================================

//! # Cache Primitives
//!
//! Hardcoded constants for the symbol cache.
//!
//! These are compiled into the binary and are immutable at runtime.
//!
//! ## Primitives
//!
//! 1. **Stats file format**: magic bytes, version and header size.
//! 2. **Scheduling score**: floors used when ranking filters of equal
//!    topological depth and priority.

/// Magic bytes for the statistics file header.
///
/// - File Header = Magic Bytes ("rsc2") + Version (u8) + reserved, then payload.
pub const MAGIC_BYTES: &[u8; 4] = b"rsc2";

/// Current statistics file format version.
///
/// Increment this when making breaking changes to the header or payload.
pub const FORMAT_VERSION: u8 = 1;

/// Fixed size of the statistics file header in bytes.
///
/// Readers reject any file shorter than this.
pub const STATS_HEADER_SIZE: usize = 32;

/// Maximum accepted statistics file size (64 MB).
///
/// A symbol table of this size is far beyond any real configuration; larger
/// files are treated as corrupt before the payload is parsed.
pub const MAX_STATS_FILE_SIZE: usize = 64 * 1024 * 1024;

/// Suffix of the temporary file written by `save` before the final rename.
pub const TEMP_FILE_SUFFIX: &str = ".new";

/// Default period (seconds) between statistics saves, used by the app layer.
pub const DEFAULT_RELOAD_TIME: f64 = 30.0;

/// Lower bound for the time term of the scheduling score (seconds).
pub const SCORE_TIME_ALPHA: f64 = 1.0;

/// Weight term used when a filter has no weight.
pub const SCORE_WEIGHT_ALPHA: f64 = 0.1;

/// Frequency term used when a filter has never fired.
pub const SCORE_FREQ_ALPHA: f64 = 0.01;

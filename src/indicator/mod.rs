//! Content indicators.
//!
//! An [`Indicator`] reads a byte source and appends one or more
//! `(key, value)` entries into an [`Indication`] that can be used to
//! identify the data. The built-ins are [`LengthIndicator`],
//! [`HashAndLengthIndicator`] (CRC-32 and SHA-256 instances) and
//! [`CompositeIndicator`], which drives several children over a single
//! pass of the source.

mod composite;
mod hash;
mod length;
mod source;

pub use composite::CompositeIndicator;
pub use hash::{HashAlgorithm, HashAndLengthIndicator};
pub use length::LengthIndicator;
pub use source::{ByteSource, FileSource, MemorySource, PipeSource};

use crate::error::Result;
use crate::indication::Indication;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Key under which every built-in indicator records the byte length.
pub const LENGTH_KEY: &[u8] = b"length";
/// Key for the IEEE CRC-32 digest.
pub const CRC32_KEY: &[u8] = b"crc32";
/// Key for the SHA-256 digest.
pub const SHA256_KEY: &[u8] = b"sha256";

/// Read buffer size for streaming indicators.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

/// Reads a byte source and appends identifying entries into `out`.
///
/// Implementations observe `cancel` at every read and write; once the
/// token fires they abort with the cancellation error without writing
/// any entries.
#[async_trait]
pub trait Indicator: Send + Sync {
    async fn indicate(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn ByteSource,
        out: &mut Indication,
    ) -> Result<()>;
}

/// Comparison capability over values an indicator produced. What an
/// ordering means depends on the indicator; lengths order numerically.
pub trait IndicatorCompare {
    /// Keys whose values this comparator understands.
    fn keys(&self) -> &'static [&'static [u8]];

    /// Order two values recorded under `key`, or `cannot-compare` when
    /// the key is not one of [`keys`](Self::keys).
    fn compare(&self, key: &[u8], a: &[u8], b: &[u8]) -> Result<Ordering>;
}

/// Resolve an indicator by its CLI name.
pub fn parse_indicator(name: &str) -> Option<Arc<dyn Indicator>> {
    match name {
        "length" => Some(Arc::new(LengthIndicator)),
        "crc32" => Some(Arc::new(HashAndLengthIndicator::crc32())),
        "sha256" => Some(Arc::new(HashAndLengthIndicator::sha256())),
        _ => None,
    }
}

/// Names accepted by [`parse_indicator`], for CLI help and errors.
pub const INDICATOR_NAMES: &[&str] = &["length", "crc32", "sha256"];

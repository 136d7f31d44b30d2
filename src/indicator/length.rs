use super::source::ByteSource;
use super::{Indicator, IndicatorCompare, LENGTH_KEY, READ_CHUNK};
use crate::error::{AppError, Result};
use crate::indication::Indication;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::io::SeekFrom;
use tokio_util::sync::CancellationToken;

/// Determines the byte length of a source without hashing it.
///
/// Fast paths, probed in order: a length the source knows outright, a
/// stat'ed file size, a seek to the end and back, and finally reading
/// the whole stream and counting. The value is recorded as an 8-byte
/// big-endian unsigned integer under `"length"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthIndicator;

#[async_trait]
impl Indicator for LengthIndicator {
    async fn indicate(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn ByteSource,
        out: &mut Indication,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let length = if let Some(len) = source.known_len() {
            len
        } else if let Some(stat) = source.stat_len().await {
            stat?
        } else if source.is_seekable() {
            // seek to the end for the length, then back to where we
            // started; we might be starting in the middle
            let offset = source.seek(SeekFrom::Current(0)).await?;
            let end = source.seek(SeekFrom::End(0)).await?;
            source.seek(SeekFrom::Start(offset)).await?;
            end - offset
        } else {
            read_and_count(cancel, source).await?
        };
        out.write(LENGTH_KEY, &length.to_be_bytes());
        Ok(())
    }
}

/// Last resort: consume the stream and count its bytes.
async fn read_and_count(cancel: &CancellationToken, source: &mut dyn ByteSource) -> Result<u64> {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut length = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        let n = source.read_chunk(&mut buf).await?;
        if n == 0 {
            return Ok(length);
        }
        length += n as u64;
    }
}

static LENGTH_KEYS: &[&[u8]] = &[LENGTH_KEY];

impl IndicatorCompare for LengthIndicator {
    fn keys(&self) -> &'static [&'static [u8]] {
        LENGTH_KEYS
    }

    fn compare(&self, key: &[u8], a: &[u8], b: &[u8]) -> Result<Ordering> {
        if key != LENGTH_KEY {
            return Err(AppError::CannotCompare { key: key.to_vec() });
        }
        let decode = |v: &[u8]| -> Result<u64> {
            let bytes: [u8; 8] = v
                .try_into()
                .map_err(|_| AppError::CannotCompare { key: key.to_vec() })?;
            Ok(u64::from_be_bytes(bytes))
        };
        Ok(decode(a)?.cmp(&decode(b)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::source::MemorySource;

    #[tokio::test]
    async fn length_of_memory_source() {
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(&b"hello, world!"[..]);
        let mut ind = Indication::new();
        LengthIndicator
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap();
        let mut reader = ind.reader();
        let (key, value) = reader.next_entry().unwrap().unwrap();
        assert_eq!(key, b"length");
        assert_eq!(value, 13u64.to_be_bytes());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_token_writes_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut src = MemorySource::new(&b"data"[..]);
        let mut ind = Indication::new();
        let err = LengthIndicator
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(ind.is_empty());
    }

    #[test]
    fn comparator_orders_lengths() {
        let cmp = LengthIndicator;
        let a = 5u64.to_be_bytes();
        let b = 9u64.to_be_bytes();
        assert_eq!(cmp.compare(b"length", &a, &b).unwrap(), Ordering::Less);
        assert_eq!(cmp.compare(b"length", &b, &a).unwrap(), Ordering::Greater);
        assert_eq!(cmp.compare(b"length", &a, &a).unwrap(), Ordering::Equal);
    }

    #[test]
    fn comparator_rejects_unknown_key() {
        let cmp = LengthIndicator;
        let v = 1u64.to_be_bytes();
        assert!(matches!(
            cmp.compare(b"crc32", &v, &v),
            Err(AppError::CannotCompare { .. })
        ));
    }
}

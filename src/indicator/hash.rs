use super::source::ByteSource;
use super::{Indicator, CRC32_KEY, LENGTH_KEY, READ_CHUNK, SHA256_KEY};
use crate::error::{AppError, Result};
use crate::indication::Indication;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

/// Hash algorithms available to [`HashAndLengthIndicator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// IEEE CRC-32 (polynomial 0xEDB88320, reflected); 4-byte digest.
    Crc32,
    /// SHA-256; 32-byte digest.
    Sha256,
}

enum HasherState {
    Crc32(crc32fast::Hasher),
    Sha256(Box<Sha256>),
}

impl HasherState {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Crc32 => HasherState::Crc32(crc32fast::Hasher::new()),
            HashAlgorithm::Sha256 => HasherState::Sha256(Box::new(Sha256::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            HasherState::Crc32(h) => h.update(data),
            HasherState::Sha256(h) => h.update(data),
        }
    }

    fn finalize(self) -> Vec<u8> {
        match self {
            // big-endian, exactly 4 bytes
            HasherState::Crc32(h) => h.finalize().to_be_bytes().to_vec(),
            HasherState::Sha256(h) => h.finalize().to_vec(),
        }
    }
}

/// Streams the whole source through a hash algorithm, counting bytes as
/// it goes. Emits `("length", be_u64)` followed by the digest under the
/// configured key.
pub struct HashAndLengthIndicator {
    algorithm: HashAlgorithm,
    key: &'static [u8],
}

impl HashAndLengthIndicator {
    pub fn new(algorithm: HashAlgorithm, key: &'static [u8]) -> Self {
        Self { algorithm, key }
    }

    /// The `("crc32", IEEE CRC-32)` instance.
    pub fn crc32() -> Self {
        Self::new(HashAlgorithm::Crc32, CRC32_KEY)
    }

    /// The `("sha256", SHA-256)` instance.
    pub fn sha256() -> Self {
        Self::new(HashAlgorithm::Sha256, SHA256_KEY)
    }
}

#[async_trait]
impl Indicator for HashAndLengthIndicator {
    async fn indicate(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn ByteSource,
        out: &mut Indication,
    ) -> Result<()> {
        let mut hasher = HasherState::new(self.algorithm);
        let mut buf = vec![0u8; READ_CHUNK];
        let mut length = 0u64;
        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            let n = source.read_chunk(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            length += n as u64;
        }
        out.write(LENGTH_KEY, &length.to_be_bytes());
        out.write(self.key, &hasher.finalize());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::source::MemorySource;

    async fn run(indicator: &HashAndLengthIndicator, data: &'static [u8]) -> Indication {
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(data);
        let mut ind = Indication::new();
        indicator
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap();
        ind
    }

    #[tokio::test]
    async fn crc32_of_hello_world() {
        let ind = run(&HashAndLengthIndicator::crc32(), b"hello, world!").await;
        let mut expect = Indication::new();
        expect.write(b"length", &13u64.to_be_bytes());
        expect.write(b"crc32", &[0x58, 0x98, 0x8d, 0x13]);
        assert_eq!(ind.bytes(), expect.bytes());
    }

    #[tokio::test]
    async fn sha256_digest_is_32_bytes() {
        let ind = run(&HashAndLengthIndicator::sha256(), b"hello, world!").await;
        let map = ind.lookup().unwrap();
        assert_eq!(map.get(&b"sha256"[..]).unwrap().len(), 32);
        assert_eq!(
            map.get(&b"length"[..]).unwrap(),
            &13u64.to_be_bytes().to_vec()
        );
    }

    #[tokio::test]
    async fn empty_source_hashes_empty_stream() {
        let ind = run(&HashAndLengthIndicator::crc32(), b"").await;
        let map = ind.lookup().unwrap();
        assert_eq!(map.get(&b"length"[..]).unwrap(), &0u64.to_be_bytes().to_vec());
        // CRC-32 of the empty string
        assert_eq!(map.get(&b"crc32"[..]).unwrap(), &vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn cancellation_aborts_without_entries() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut src = MemorySource::new(&b"data"[..]);
        let mut ind = Indication::new();
        let err = HashAndLengthIndicator::sha256()
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(ind.is_empty());
    }
}

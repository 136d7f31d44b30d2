//! Byte sources handed to indicators.
//!
//! Indicators see their input through [`ByteSource`], which advertises
//! the cheap ways a source's length can be determined: an in-memory
//! buffer knows its length outright, an open file can be stat'ed or
//! repositioned, and a fan-out pipe can only be read forward. The
//! length indicator probes these capabilities in order; hashing
//! indicators just stream.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use bytes::{Buf, Bytes};
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A readable byte stream with optional length and seek capabilities.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end of stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Length known without any I/O (in-memory sources).
    fn known_len(&self) -> Option<u64> {
        None
    }

    /// Length available from file metadata, if this source has any.
    async fn stat_len(&self) -> Option<Result<u64>> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }

    /// Reposition the stream. Only meaningful when
    /// [`is_seekable`](Self::is_seekable) returns true.
    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let _ = pos;
        Err(AppError::io("seek on a non-seekable source", None))
    }
}

/// An open local file.
pub struct FileSource {
    file: File,
}

impl FileSource {
    pub fn new(file: File) -> Self {
        Self { file }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.file.read(buf).await?)
    }

    async fn stat_len(&self) -> Option<Result<u64>> {
        Some(
            self.file
                .metadata()
                .await
                .map(|m| m.len())
                .map_err(AppError::from),
        )
    }

    fn is_seekable(&self) -> bool {
        true
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file.seek(pos).await?)
    }
}

/// An in-memory byte string with a read position.
pub struct MemorySource {
    data: Bytes,
    pos: usize,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = &self.data[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }

    fn known_len(&self) -> Option<u64> {
        Some((self.data.len() - self.pos) as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => len + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 {
            return Err(AppError::io("seek before start of buffer", None));
        }
        self.pos = (target.min(len)) as usize;
        Ok(self.pos as u64)
    }
}

/// Receiving end of a composite fan-out lane. Sequential only; end of
/// stream is observed when the sending side drops.
pub struct PipeSource {
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
}

impl PipeSource {
    pub fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

#[async_trait]
impl ByteSource for PipeSource {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv().await {
                Some(chunk) => self.pending = chunk,
                None => return Ok(0),
            }
        }
        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Wraps the real source for lane 0 of a composite, copying every block
/// it reads into the other lanes' pipes. Backpressure comes from the
/// bounded pipes: a slow child throttles the tee's sends.
///
/// Deliberately advertises no length or seek capability so every child
/// of a composite consumes the byte stream itself.
pub struct TeeSource<'a> {
    inner: &'a mut dyn ByteSource,
    taps: Vec<mpsc::Sender<Bytes>>,
    cancel: CancellationToken,
}

impl<'a> TeeSource<'a> {
    pub fn new(
        inner: &'a mut dyn ByteSource,
        taps: Vec<mpsc::Sender<Bytes>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { inner, taps, cancel }
    }
}

#[async_trait]
impl ByteSource for TeeSource<'_> {
    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read_chunk(buf).await?;
        if n == 0 {
            return Ok(0);
        }
        let block = Bytes::copy_from_slice(&buf[..n]);
        for tap in &self.taps {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
                sent = tap.send(block.clone()) => {
                    // a lane that already finished (or failed) just
                    // stops receiving; that is not the tee's error
                    let _ = sent;
                }
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_source_reads_and_seeks() {
        let mut src = MemorySource::new(&b"hello, world!"[..]);
        assert_eq!(src.known_len(), Some(13));
        let mut buf = [0u8; 5];
        assert_eq!(src.read_chunk(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(src.known_len(), Some(8));
        assert_eq!(src.seek(SeekFrom::Start(0)).await.unwrap(), 0);
        assert_eq!(src.seek(SeekFrom::End(0)).await.unwrap(), 13);
        assert_eq!(src.read_chunk(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pipe_source_drains_chunks_then_ends() {
        let (tx, rx) = mpsc::channel(1);
        let mut src = PipeSource::new(rx);
        tx.send(Bytes::from_static(b"abcd")).await.unwrap();
        drop(tx);
        let mut buf = [0u8; 3];
        assert_eq!(src.read_chunk(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(src.read_chunk(&mut buf).await.unwrap(), 1);
        assert_eq!(buf[0], b'd');
        assert_eq!(src.read_chunk(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tee_source_copies_reads_into_taps() {
        let mut inner = MemorySource::new(&b"stream"[..]);
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let mut tee = TeeSource::new(&mut inner, vec![tx], cancel);
        assert!(tee.known_len().is_none());
        assert!(!tee.is_seekable());
        let mut buf = [0u8; 16];
        let n = tee.read_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"stream");
        assert_eq!(tee.read_chunk(&mut buf).await.unwrap(), 0);
        drop(tee);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"stream"));
        assert!(rx.recv().await.is_none());
    }
}

use super::source::{ByteSource, PipeSource, TeeSource};
use super::Indicator;
use crate::error::{AppError, Result};
use crate::indication::Indication;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of each fan-out lane pipe. One block in flight per lane
/// keeps memory bounded; a slow child throttles lane 0 through the full
/// pipe.
const LANE_PIPE_DEPTH: usize = 1;

/// Drives several child indicators over a single pass of one source.
///
/// Lane 0 reads the real source through a tee that copies every block
/// into the other lanes' pipes; lanes 1..n−1 each consume their pipe.
/// Every lane fills its own indication buffer, and when all lanes have
/// finished the buffers are merged into the caller's output in child
/// order with first-writer-wins key de-duplication. Per-lane errors are
/// aggregated rather than short-circuiting, so lanes that succeeded
/// still contribute to the merge.
pub struct CompositeIndicator {
    children: Vec<Arc<dyn Indicator>>,
    closed: AtomicBool,
}

impl CompositeIndicator {
    pub fn new(children: Vec<Arc<dyn Indicator>>) -> Self {
        Self {
            children,
            closed: AtomicBool::new(false),
        }
    }

    /// Retire this composite. Subsequent `indicate` calls fail with
    /// `indicator-closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Indicator for CompositeIndicator {
    async fn indicate(
        &self,
        cancel: &CancellationToken,
        source: &mut dyn ByteSource,
        out: &mut Indication,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::IndicatorClosed);
        }
        if self.children.is_empty() {
            return Ok(());
        }

        // Lanes 1..n read from single-producer pipes fed by lane 0's tee.
        let mut lanes = JoinSet::new();
        let mut taps = Vec::with_capacity(self.children.len() - 1);
        for (index, child) in self.children.iter().enumerate().skip(1) {
            let (tx, rx) = mpsc::channel(LANE_PIPE_DEPTH);
            taps.push(tx);
            let child = Arc::clone(child);
            let cancel = cancel.clone();
            lanes.spawn(async move {
                let mut pipe = PipeSource::new(rx);
                let mut ind = Indication::new();
                let result = child.indicate(&cancel, &mut pipe, &mut ind).await;
                (index, ind, result)
            });
        }

        // Lane 0 drives the read; dropping the tee afterwards drops the
        // pipe senders, which the other lanes observe as end of stream.
        let mut lane0_ind = Indication::new();
        let lane0_result = {
            let mut tee = TeeSource::new(source, taps, cancel.clone());
            self.children[0]
                .indicate(cancel, &mut tee, &mut lane0_ind)
                .await
        };

        let mut results: Vec<Option<(Indication, Result<()>)>> =
            Vec::with_capacity(self.children.len());
        results.resize_with(self.children.len(), || None);
        results[0] = Some((lane0_ind, lane0_result));

        let mut errors = Vec::new();
        while let Some(joined) = lanes.join_next().await {
            match joined {
                Ok((index, ind, result)) => results[index] = Some((ind, result)),
                Err(join_err) => {
                    errors.push(AppError::io(
                        format!("indicator lane failed to run: {join_err}"),
                        None,
                    ));
                }
            }
        }

        // Merge in child order; the first child to write a key wins.
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        for entry in results.into_iter().flatten() {
            let (ind, result) = entry;
            if let Err(err) = result {
                errors.push(err);
                continue;
            }
            let merged = ind.each(|key, value| {
                if seen.insert(key.to_vec()) {
                    out.write(key, value);
                }
                Ok(())
            });
            if let Err(err) = merged {
                errors.push(err);
            }
        }

        AppError::aggregate(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::source::MemorySource;
    use crate::indicator::{HashAndLengthIndicator, LengthIndicator};

    fn composite_of(children: Vec<Arc<dyn Indicator>>) -> CompositeIndicator {
        CompositeIndicator::new(children)
    }

    #[tokio::test]
    async fn merges_children_with_first_writer_wins() {
        let composite = composite_of(vec![
            Arc::new(HashAndLengthIndicator::crc32()),
            Arc::new(HashAndLengthIndicator::sha256()),
        ]);
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(&b"hello, world!"[..]);
        let mut ind = Indication::new();
        composite
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap();

        // "length" appears once (from the crc32 child), then crc32, then sha256
        let keys: Vec<Vec<u8>> = ind
            .reader()
            .map(|e| e.unwrap().0.to_vec())
            .collect();
        assert_eq!(keys, vec![b"length".to_vec(), b"crc32".to_vec(), b"sha256".to_vec()]);
    }

    #[tokio::test]
    async fn single_child_composite_matches_child_alone() {
        let composite = composite_of(vec![Arc::new(LengthIndicator)]);
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(&b"abc"[..]);
        let mut via_composite = Indication::new();
        composite
            .indicate(&cancel, &mut src, &mut via_composite)
            .await
            .unwrap();

        let mut src2 = MemorySource::new(&b"abc"[..]);
        let mut direct = Indication::new();
        LengthIndicator
            .indicate(&cancel, &mut src2, &mut direct)
            .await
            .unwrap();

        assert_eq!(via_composite.bytes(), direct.bytes());
    }

    #[tokio::test]
    async fn indicate_after_close_fails() {
        let composite = composite_of(vec![Arc::new(LengthIndicator)]);
        composite.close();
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(&b"abc"[..]);
        let mut ind = Indication::new();
        assert!(matches!(
            composite.indicate(&cancel, &mut src, &mut ind).await,
            Err(AppError::IndicatorClosed)
        ));
    }

    #[tokio::test]
    async fn empty_composite_writes_nothing() {
        let composite = composite_of(vec![]);
        let cancel = CancellationToken::new();
        let mut src = MemorySource::new(&b"abc"[..]);
        let mut ind = Indication::new();
        composite
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap();
        assert!(ind.is_empty());
    }

    #[tokio::test]
    async fn cancellation_propagates_to_every_lane() {
        let composite = composite_of(vec![
            Arc::new(HashAndLengthIndicator::crc32()),
            Arc::new(HashAndLengthIndicator::sha256()),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut src = MemorySource::new(&b"hello"[..]);
        let mut ind = Indication::new();
        let err = composite
            .indicate(&cancel, &mut src, &mut ind)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(ind.is_empty());
    }
}

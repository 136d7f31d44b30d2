//! The scan → indicate → persist pipeline.
//!
//! ```text
//! roots → [scan workers] → requests → [N indicate workers] → results → [persist] → repository
//! ```
//!
//! Stages are connected by bounded channels; a single cancellation
//! token is threaded through every stage and observed at each read,
//! write or channel operation. Shutdown is ordered: scan workers drain
//! and the request channel closes, indicate workers drain and the
//! result channel closes, then the persist worker drains and the run
//! returns. Per-file errors are logged or reported on the results
//! channel and never tear the pipeline down; a repository error is
//! fatal and cancels the run.

mod scan;

use crate::error::{AppError, Result};
use crate::indication::{Indication, IndicationPool};
use crate::indicator::{ByteSource, Indicator};
use crate::repository::Repository;
use crate::uri::{ResourceUri, FILE_SCHEME};
use std::future::Future;
use std::io::SeekFrom;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Depth of the request and result channels.
const CHANNEL_DEPTH: usize = 1024;

/// Idle indication buffers kept by the pipeline's pool.
const POOL_CAPACITY: usize = 64;

pub type OpenFuture = Pin<Box<dyn Future<Output = Result<Box<dyn ByteSource>>> + Send>>;

/// Deferred open of a resource: invoked by the indicate worker that
/// picks the request up, yielding a readable, seekable source.
pub type OpenFn = Box<dyn FnOnce() -> OpenFuture + Send>;

/// One unit of work from the scan stage.
pub struct IndicationRequest {
    pub uri: ResourceUri,
    pub open: OpenFn,
}

/// One outcome from the indicate stage.
pub struct IndicationResult {
    pub uri: ResourceUri,
    pub outcome: Result<Indication>,
}

/// Default indicate-worker count: three quarters of the CPUs, at least
/// one.
pub fn default_workers() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// The concurrent scan → indicate → persist topology.
pub struct Pipeline {
    repository: Arc<dyn Repository>,
    indicators: Arc<[Arc<dyn Indicator>]>,
    pool: Arc<IndicationPool>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        repository: Arc<dyn Repository>,
        indicators: Vec<Arc<dyn Indicator>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            repository,
            indicators: indicators.into(),
            pool: Arc::new(IndicationPool::new(POOL_CAPACITY)),
            config,
        }
    }

    /// Scan every root, indicate every file found, and persist the
    /// results. Returns once all stages have drained; a repository
    /// failure cancels the run and is returned.
    pub async fn run(&self, roots: Vec<ResourceUri>, cancel: CancellationToken) -> Result<()> {
        for root in &roots {
            if root.scheme != FILE_SCHEME {
                return Err(AppError::InvalidUri {
                    uri: root.to_string(),
                    message: format!("URI scheme {:?} is not supported", root.scheme),
                });
            }
        }

        let (request_tx, request_rx) = mpsc::channel::<IndicationRequest>(CHANNEL_DEPTH);
        let (result_tx, result_rx) = mpsc::channel::<IndicationResult>(CHANNEL_DEPTH);

        let persist = tokio::spawn(persist_worker(
            result_rx,
            Arc::clone(&self.repository),
            Arc::clone(&self.pool),
            cancel.clone(),
        ));

        let request_rx = Arc::new(Mutex::new(request_rx));
        let mut indicate_workers = JoinSet::new();
        for worker in 0..self.config.workers.max(1) {
            indicate_workers.spawn(indicate_worker(
                worker,
                Arc::clone(&request_rx),
                result_tx.clone(),
                Arc::clone(&self.indicators),
                Arc::clone(&self.pool),
                cancel.clone(),
            ));
        }
        drop(result_tx);

        let mut scan_workers = JoinSet::new();
        for root in roots {
            scan_workers.spawn(scan::scan_local_files(
                root,
                request_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(request_tx);

        // Ordered shutdown: scanners first, then the indicate workers
        // observe the closed request channel, then the persist worker
        // observes the closed result channel.
        while let Some(joined) = scan_workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "scan worker did not finish cleanly");
            }
        }
        debug!("scan stage drained");
        while let Some(joined) = indicate_workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "indicate worker did not finish cleanly");
            }
        }
        debug!("indicate stage drained");
        let outcome = persist
            .await
            .map_err(|err| AppError::io(format!("persist worker did not finish: {err}"), None))?;
        debug!("persist stage drained");
        outcome
    }
}

async fn indicate_worker(
    worker: usize,
    requests: Arc<Mutex<mpsc::Receiver<IndicationRequest>>>,
    results: mpsc::Sender<IndicationResult>,
    indicators: Arc<[Arc<dyn Indicator>]>,
    pool: Arc<IndicationPool>,
    cancel: CancellationToken,
) {
    debug!(worker, "indicate worker started");
    loop {
        let request = { requests.lock().await.recv().await };
        let Some(request) = request else { break };
        if cancel.is_cancelled() {
            // drain without taking on new work
            let _ = results
                .send(IndicationResult {
                    uri: request.uri,
                    outcome: Err(AppError::Cancelled),
                })
                .await;
            break;
        }
        let mut ind = pool.acquire();
        let outcome = indicate_request(&cancel, &indicators, request.open, &mut ind).await;
        let outcome = match outcome {
            Ok(()) => Ok(ind),
            Err(err) => {
                pool.release(ind);
                Err(err)
            }
        };
        let sent = results
            .send(IndicationResult {
                uri: request.uri,
                outcome,
            })
            .await;
        if sent.is_err() {
            // persist stage is gone; nothing left to report to
            break;
        }
    }
    debug!(worker, "indicate worker stopped");
}

/// Run every configured indicator over one opened resource, seeking
/// back to the starting offset between indicators. The source handle
/// closes on every exit path when it drops.
async fn indicate_request(
    cancel: &CancellationToken,
    indicators: &[Arc<dyn Indicator>],
    open: OpenFn,
    out: &mut Indication,
) -> Result<()> {
    let mut source = open().await?;
    let start = source.seek(SeekFrom::Current(0)).await?;
    for indicator in indicators {
        indicator.indicate(cancel, source.as_mut(), out).await?;
        source.seek(SeekFrom::Start(start)).await?;
    }
    Ok(())
}

/// Single consumer of the results channel and sole owner of repository
/// writes.
async fn persist_worker(
    mut results: mpsc::Receiver<IndicationResult>,
    repository: Arc<dyn Repository>,
    pool: Arc<IndicationPool>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut stored = 0u64;
    while let Some(result) = results.recv().await {
        match result.outcome {
            Err(err) if err.is_cancelled() => {
                debug!(uri = %result.uri, "indication cancelled");
            }
            Err(err) => {
                warn!(uri = %result.uri, error = %err, "failed to indicate resource");
            }
            Ok(ind) => {
                if let Err(err) = repository.set_indications(&result.uri, &ind).await {
                    error!(
                        uri = %result.uri,
                        error = %err,
                        "failed to store indications; cancelling pipeline"
                    );
                    pool.release(ind);
                    cancel.cancel();
                    return Err(err);
                }
                stored += 1;
                pool.release(ind);
            }
        }
    }
    info!(stored, "persist worker drained");
    Ok(())
}

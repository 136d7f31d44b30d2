//! Local-file scanning.
//!
//! One scan worker runs per `file`-scheme root, recursively
//! enumerating directory entries and emitting an indication request
//! per regular file. Read errors are logged and the affected subtree
//! abandoned; they are never fatal to the pipeline. Retrying is left
//! to whoever invokes the scan.

use super::{IndicationRequest, OpenFuture};
use crate::error::AppError;
use crate::indicator::{ByteSource, FileSource};
use crate::uri::ResourceUri;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Scan the directory tree under `root`, sending one request per file.
pub(super) async fn scan_local_files(
    root: ResourceUri,
    requests: mpsc::Sender<IndicationRequest>,
    cancel: CancellationToken,
) {
    let path = root.to_local_path();
    debug!(root = %root, path = %path.display(), "scan worker started");
    scan_directory(path, &requests, &cancel).await;
    debug!(root = %root, "scan worker stopped");
}

fn scan_directory<'a>(
    path: PathBuf,
    requests: &'a mpsc::Sender<IndicationRequest>,
    cancel: &'a CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to open directory for reading; abandoning subtree"
                );
                return;
            }
        };
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => return,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to read next directory entry; abandoning subtree"
                    );
                    return;
                }
            };
            let entry_path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(path = %entry_path.display(), error = %err, "failed to stat entry");
                    continue;
                }
            };
            if file_type.is_dir() {
                // subdirectories recurse on the same worker
                scan_directory(entry_path, requests, cancel).await;
            } else if file_type.is_file() {
                let request = IndicationRequest {
                    uri: ResourceUri::from_local_path(&entry_path),
                    open: Box::new(move || open_file(entry_path)),
                };
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = requests.send(request) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    })
}

fn open_file(path: PathBuf) -> OpenFuture {
    Box::pin(async move {
        let file = tokio::fs::File::open(&path).await.map_err(|err| AppError::Io {
            message: format!("failed to open {} for reading", path.display()),
            path: Some(path.clone()),
            source: Some(err),
        })?;
        Ok(Box::new(FileSource::new(file)) as Box<dyn ByteSource>)
    })
}

//! 🎬 *[a channel fills with sealed chunks. somewhere, a bucket waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 📤 The UploadWorker: patient, tireless, and deeply unbothered by the compression
//! happening upstream. It receives chunks. It uploads chunks. In order. It asks no questions.
//!
//! One worker, one consumer, FIFO. That's what keeps chunk N landing before chunk N+1.
//! The first upload that doesn't come back `Success` ends the worker with an error;
//! dropping the receiver makes the exporter's next `send` fail, and the exporter goes
//! looking for the reason here.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::Worker;
use crate::backends::{ObjectStore, ObjectStoreBackend, StoreOutcome};
use crate::common::{StagingArtifact, UploadedChunk};
use crate::supervisors::exporter::SealedChunk;

#[derive(Debug)]
pub(crate) struct UploadWorker {
    rx: Receiver<SealedChunk>,
    store: Arc<ObjectStoreBackend>,
    artifact: StagingArtifact,
}

impl UploadWorker {
    pub(crate) fn new(
        rx: Receiver<SealedChunk>,
        store: Arc<ObjectStoreBackend>,
        artifact: StagingArtifact,
    ) -> Self {
        Self { rx, store, artifact }
    }
}

impl Worker for UploadWorker {
    type Output = Vec<UploadedChunk>;

    fn start(self) -> JoinHandle<Result<Vec<UploadedChunk>>> {
        tokio::spawn(async move {
            debug!("📤 UploadWorker started draining channel...");
            let mut uploaded = Vec::new();

            // -- 🏁 recv() errs once the channel is empty and the exporter dropped its sender
            while let Ok(chunk) = self.rx.recv().await {
                let the_key = self.artifact.chunk_key(chunk.number);
                match self.store.put(&the_key, chunk.file.path()).await {
                    StoreOutcome::Success(etag) => {
                        info!(
                            "📤 uploaded s3://{}/{} ({} bytes compressed)",
                            self.store.bucket(),
                            the_key,
                            chunk.compressed_bytes
                        );
                        uploaded.push(UploadedChunk {
                            number: chunk.number,
                            key: the_key,
                            etag,
                            uncompressed_bytes: chunk.uncompressed_bytes,
                            compressed_bytes: chunk.compressed_bytes,
                        });
                    }
                    StoreOutcome::Retryable(reason) | StoreOutcome::Fatal(reason) => {
                        return Err(anyhow!(
                            "💀 Upload of s3://{}/{} failed: {reason}",
                            self.store.bucket(),
                            the_key
                        ));
                    }
                }
                // -- 🗑️ chunk (and its temp file) drops here, after the upload read it
            }

            debug!("🏁 UploadWorker: channel closed after {} chunk(s)", uploaded.len());
            Ok(uploaded)
        })
    }
}

// ai
//! 🎬 COLD OPEN: INT. COMPRESSION PLANT, NIGHT SHIFT
//!
//! The COPY stream never stops talking. Buffer after buffer, some mid-row, some
//! mid-word, some just a lonely pipe character. The exporter doesn't care about rows.
//! It counts bytes. When the count goes over the line, it seals the box, slaps a
//! number on it, and hands it to the uploader. Then it grabs a fresh box.
//!
//! 📦 The export engine: one table in, one staging artifact out.
//!
//! 🧠 Knowledge graph:
//! - pre-clean: delete the base key, then every `<base>.<N>` and `<base>.manifest` a
//!   listing turns up. Advisory, logged, never fatal.
//! - pump: stream → `ChunkWriter` (gzip over a temp file) → seal when the uncompressed
//!   count goes strictly over the threshold → bounded channel → `UploadWorker`
//! - the last chunk ships unconditionally, even empty. Every table gets at least one object.
//! - manifest mode: upload `<base>.manifest` listing every chunk URL
//! - finally: reset the source session
//!
//! ⚠️ Gzip writes are blocking I/O on the async task. They're sequential with the stream
//! anyway, and the upload runs elsewhere. The temp file is the only buffer; nothing
//! table-sized ever lives in memory.

use std::io::{Seek, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use flate2::Compression;
use flate2::write::GzEncoder;
use futures::StreamExt;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::app_config::{LoadMode, RuntimeConfig};
use crate::backends::{ExportStream, ObjectStore, ObjectStoreBackend, Source, StoreOutcome};
use crate::common::{StagingArtifact, TableDescriptor, UploadedChunk};
use crate::composers;
use crate::progress::TableProgress;
use crate::supervisors::workers::{UploadWorker, Worker};

/// 🔍 Enough for any table under a petabyte at the default threshold.
const PRE_CLEAN_LIST_LIMIT: i32 = 100_000;

// ============================================================
// 📦 ChunkWriter: one gzip member, one temp file, one owner
// ============================================================

/// 📦 The box currently being filled.
///
/// Owns the temp file through the encoder. Dropping a `ChunkWriter` on any path,
/// `?` included, drops the `NamedTempFile` and the file goes with it.
pub(crate) struct ChunkWriter {
    number: u32,
    encoder: GzEncoder<NamedTempFile>,
    uncompressed_bytes: u64,
}

impl ChunkWriter {
    pub(crate) fn create(number: u32) -> Result<Self> {
        let the_file = NamedTempFile::new()
            .context(format!("💀 Could not create a temp file for chunk {number}"))?;
        Ok(Self {
            number,
            encoder: GzEncoder::new(the_file, Compression::default()),
            uncompressed_bytes: 0,
        })
    }

    pub(crate) fn number(&self) -> u32 {
        self.number
    }

    pub(crate) fn uncompressed_bytes(&self) -> u64 {
        self.uncompressed_bytes
    }

    pub(crate) fn write(&mut self, buffer: &[u8]) -> Result<()> {
        self.encoder
            .write_all(buffer)
            .context(format!("💀 Could not compress into chunk {}", self.number))?;
        self.uncompressed_bytes += buffer.len() as u64;
        Ok(())
    }

    /// 🔒 Write the gzip trailer, flush, rewind. The box is closed.
    pub(crate) fn seal(self) -> Result<SealedChunk> {
        let mut the_file = self
            .encoder
            .finish()
            .context(format!("💀 Could not finish the gzip stream for chunk {}", self.number))?;
        the_file.flush()?;
        the_file.rewind()?;
        let compressed_bytes = the_file
            .as_file()
            .metadata()
            .context(format!("💀 Could not stat chunk {}", self.number))?
            .len();
        Ok(SealedChunk {
            number: self.number,
            file: the_file,
            uncompressed_bytes: self.uncompressed_bytes,
            compressed_bytes,
        })
    }
}

/// 📦 A finished gzip file waiting for its upload. The temp file lives as long as this does.
#[derive(Debug)]
pub(crate) struct SealedChunk {
    pub(crate) number: u32,
    pub(crate) file: NamedTempFile,
    pub(crate) uncompressed_bytes: u64,
    pub(crate) compressed_bytes: u64,
}

// ============================================================
// 🏭 ExportEngine
// ============================================================

/// ✅ What one export left in the bucket.
#[derive(Debug, Clone)]
pub(crate) struct ExportSummary {
    pub(crate) artifact: StagingArtifact,
    /// 📦 in chunk order
    pub(crate) chunks: Vec<UploadedChunk>,
}

impl ExportSummary {
    pub(crate) fn uncompressed_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.uncompressed_bytes).sum()
    }

    pub(crate) fn compressed_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.compressed_bytes).sum()
    }
}

#[derive(Debug)]
pub(crate) struct ExportEngine {
    store: Arc<ObjectStoreBackend>,
    export_prefix: String,
    chunk_size_bytes: u64,
    load_mode: LoadMode,
    upload_queue_capacity: usize,
}

impl ExportEngine {
    pub(crate) fn new(store: Arc<ObjectStoreBackend>, export_prefix: &str, runtime: &RuntimeConfig) -> Self {
        Self {
            store,
            export_prefix: export_prefix.to_string(),
            chunk_size_bytes: runtime.chunk_size_bytes,
            load_mode: runtime.load_mode,
            upload_queue_capacity: runtime.upload_queue_capacity.max(1),
        }
    }

    /// 🚀 Export one table into its staging artifact.
    pub(crate) async fn export<S: Source>(
        &self,
        source: &mut S,
        table: &TableDescriptor,
        progress: &mut TableProgress,
    ) -> Result<ExportSummary> {
        let the_artifact = StagingArtifact::new(&self.export_prefix, &table.target_name);

        self.pre_clean(&the_artifact).await;

        info!("📡 exporting {table}");
        let the_stream = source
            .copy_out(&composers::copy_out_query(table))
            .await
            .context(format!("💀 Could not start the export of {table}"))?;

        let (tx, rx) = async_channel::bounded(self.upload_queue_capacity);
        let the_uploader = UploadWorker::new(rx, Arc::clone(&self.store), the_artifact.clone()).start();

        // -- 📦 tx moves in and drops on the way out, which is what lets the worker finish
        let the_pumping = self.pump(the_stream, tx, table, progress).await;
        let the_uploads = the_uploader
            .await
            .context(format!("💀 The upload worker for {table} panicked"))?;

        // -- 🥇 an upload failure explains a pump failure, not the other way round
        let mut the_chunks = match (the_pumping, the_uploads) {
            (_, Err(upload_err)) => return Err(upload_err.context(format!("💀 Export of {table} failed"))),
            (Err(pump_err), Ok(_)) => return Err(pump_err),
            (Ok(()), Ok(chunks)) => chunks,
        };
        the_chunks.sort_by_key(|c| c.number);

        if self.load_mode == LoadMode::Manifest {
            self.upload_manifest(&the_artifact, &the_chunks)
                .await
                .context(format!("💀 Export of {table} failed"))?;
        }

        source
            .reset()
            .await
            .context(format!("💀 Could not reset the source after exporting {table}"))?;

        Ok(ExportSummary {
            artifact: the_artifact,
            chunks: the_chunks,
        })
    }

    /// 🧹 Best-effort removal of whatever a previous run left under this artifact's keys.
    async fn pre_clean(&self, artifact: &StagingArtifact) {
        let bucket = self.store.bucket();
        match self.store.delete(artifact.base_key()).await {
            StoreOutcome::Success(true) => info!("🗑️ object '{}' deleted", artifact.base_key()),
            StoreOutcome::Success(false) => info!("🗑️ object '{}' not deleted", artifact.base_key()),
            failed => warn!("🗑️ s3://{bucket}/{}: pre-clean delete failed: {failed:?}", artifact.base_key()),
        }

        let the_leftovers = match self
            .store
            .list(Some(artifact.base_key()), PRE_CLEAN_LIST_LIMIT)
            .await
        {
            Ok(objects) => objects,
            Err(err) => {
                warn!("🗑️ s3://{bucket}/{}: could not list stale chunks: {err:#}", artifact.base_key());
                return;
            }
        };

        for stale in the_leftovers
            .iter()
            .filter(|o| o.key != artifact.base_key() && artifact.owns_key(&o.key))
        {
            match self.store.delete(&stale.key).await {
                StoreOutcome::Success(_) => debug!("🗑️ stale object '{}' deleted", stale.key),
                failed => warn!("🗑️ s3://{bucket}/{}: stale delete failed: {failed:?}", stale.key),
            }
        }
    }

    /// 🚰 Stream → chunks → channel.
    async fn pump(
        &self,
        mut stream: ExportStream,
        tx: async_channel::Sender<SealedChunk>,
        table: &TableDescriptor,
        progress: &mut TableProgress,
    ) -> Result<()> {
        let mut the_writer = ChunkWriter::create(1)?;

        while let Some(buffer) = stream.next().await {
            let buffer = buffer.context(format!("💀 The export stream for {table} broke"))?;
            the_writer.write(&buffer)?;
            progress.add_bytes(buffer.len() as u64);

            if the_writer.uncompressed_bytes() > self.chunk_size_bytes {
                let the_next = ChunkWriter::create(the_writer.number() + 1)?;
                let the_sealed = std::mem::replace(&mut the_writer, the_next).seal()?;
                Self::ship(&tx, the_sealed, progress).await?;
            }
        }

        // -- 📦 the last box ships no matter how empty it is
        Self::ship(&tx, the_writer.seal()?, progress).await
    }

    async fn ship(
        tx: &async_channel::Sender<SealedChunk>,
        chunk: SealedChunk,
        progress: &mut TableProgress,
    ) -> Result<()> {
        debug!(
            "📦 sealed chunk {} ({} bytes in, {} bytes out)",
            chunk.number, chunk.uncompressed_bytes, chunk.compressed_bytes
        );
        let the_number = chunk.number;
        tx.send(chunk)
            .await
            .map_err(|_| anyhow!("💀 The uploader stopped taking chunks before chunk {the_number}"))?;
        progress.chunk_sealed();
        Ok(())
    }

    async fn upload_manifest(&self, artifact: &StagingArtifact, chunks: &[UploadedChunk]) -> Result<()> {
        let the_manifest = composers::manifest_json(self.store.bucket(), chunks)?;
        let mut the_file = NamedTempFile::new().context("💀 Could not create a temp file for the manifest")?;
        the_file
            .write_all(the_manifest.as_bytes())
            .context("💀 Could not write the manifest")?;
        the_file.flush()?;

        let the_key = artifact.manifest_key();
        let the_etag = self
            .store
            .put(&the_key, the_file.path())
            .await
            .into_result()
            .context(format!("💀 Upload of s3://{}/{} failed", self.store.bucket(), the_key))?;
        info!("📜 uploaded manifest s3://{}/{} ({the_etag})", self.store.bucket(), the_key);
        Ok(())
    }
}

//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the
//! credit in the sprint retro.
//!
//! 🚀 Right now the factory floor has exactly one employee, the `UploadWorker`. It drains
//! sealed chunks off a bounded channel and puts them in the bucket, one at a time, in the
//! order they arrived. Meanwhile the exporter is already compressing the next chunk. 🦆
//!
//! ⚠️ "If you're reading this, the code review went poorly."

use anyhow::Result;
use tokio::task::JoinHandle;

mod upload_worker;
pub(crate) use upload_worker::UploadWorker;

/// 🏗️ A background worker, that does work. duh.
///
/// 🎯 The trait that all workers must implement, like a social contract
/// but enforced by the compiler instead of polite society.
pub(crate) trait Worker {
    /// 📦 what the worker hands back when it's done
    type Output: Send + 'static;

    /// 🚀 Start the worker. Returns a JoinHandle because we trust
    /// but verify. Mostly verify. Okay, we don't trust at all.
    fn start(self) -> JoinHandle<Result<Self::Output>>;
}

// ai
//! 🔌 Backends: where the real I/O happens.
//!
//! 🐘 The Source pours rows out of Postgres, the ObjectStore holds them in a bucket
//! for a while, and the Warehouse slurps them into Redshift. In between, we panic!
//! (kidding, we use anyhow)
//!
//! 🎭 This module is the casting agency. Every seam the supervisor talks to is a trait
//! here, and every trait has a backend enum that dispatches to the real thing or to an
//! in-memory stand-in. The supervisor never learns which one it got. Ignorance is a
//! feature. It's called "abstraction."
//!
//! 🧠 Knowledge graph:
//! - `Catalog`: table and column discovery (information_schema)
//! - `Source`: `COPY ... TO STDOUT` as a stream of `Bytes`, plus `reset()` between tables
//! - `ObjectStore`: delete / put / list, each outcome typed as a `StoreOutcome`
//! - `Warehouse`: run one SQL statement, succeed or explain
//!
//! 🦆 The duck is here because every file must have one. This is law.

use std::path::Path;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::common::ObjectSummary;

pub mod common_config;
#[cfg(test)]
pub(crate) mod in_mem;
pub(crate) mod postgres;
pub(crate) mod redshift;
pub(crate) mod s3;

// 🎯 Re-export backend-specific configs so callers can do `backends::ObjectStoreConfig`
// instead of spelunking into `backends::s3::ObjectStoreConfig`.
pub use postgres::PostgresSourceConfig;
pub use redshift::RedshiftTargetConfig;
pub use s3::ObjectStoreConfig;

#[cfg(test)]
pub(crate) use in_mem::{InMemoryObjectStore, InMemorySource, InMemoryWarehouse};
pub(crate) use postgres::PostgresSource;
pub(crate) use redshift::RedshiftWarehouse;
pub(crate) use s3::S3Store;

// ===== Outcomes =====

/// 🎲 What an object store call actually did.
///
/// Three doors. Behind door one, the thing you asked for. Behind door two, a failure
/// that might go away if someone tried again (we won't, but the caller deserves to know).
/// Behind door three, a failure that won't.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome<T> {
    Success(T),
    /// ⏳ timeouts, dropped connections, 5xx, throttling
    Retryable(String),
    /// 💀 access denied, no such bucket, no ETag, anything else
    Fatal(String),
}

impl<T> StoreOutcome<T> {
    /// 🔄 Flatten into an `anyhow::Result`. Both failure kinds become errors.
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Retryable(reason) => Err(anyhow!("⏳ retryable store failure: {reason}")),
            Self::Fatal(reason) => Err(anyhow!("💀 fatal store failure: {reason}")),
        }
    }
}

// ===== Catalog rows =====

/// 📋 One row from `information_schema.tables`, minus the columns nobody reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTable {
    pub name: String,
    pub is_view: bool,
}

/// 📋 One row from `information_schema.columns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub name: String,
    pub data_type: String,
    pub ordinal_position: i32,
}

/// 🚰 The bulk-export byte stream. Arbitrarily sized buffers, not row-aligned, `'static`
/// so it can outlive the borrow that created it.
pub type ExportStream = BoxStream<'static, Result<Bytes>>;

// ===== Traits =====

/// 📚 Where table and column lists come from.
#[async_trait]
pub(crate) trait Catalog: std::fmt::Debug + Send {
    /// 🗂️ Every candidate table in the source schema, catalog order.
    async fn list_tables(&mut self) -> Result<Vec<CatalogTable>>;
    /// 📋 Every column of one table. Order is not promised here; `transforms` sorts.
    async fn list_columns(&mut self, table_name: &str) -> Result<Vec<CatalogColumn>>;
}

/// 🚰 A source that streams a bulk export.
///
/// # Contract
/// - `copy_out` starts the export and hands back the stream. The stream is the only
///   outstanding statement on the connection until it is drained or dropped.
/// - `reset` is called after every table so no session state leaks into the next one.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn copy_out(&mut self, query: &str) -> Result<ExportStream>;
    async fn reset(&mut self) -> Result<()>;
}

/// 🪣 The object store gateway. Every call reports a typed outcome instead of a shrug.
#[async_trait]
pub(crate) trait ObjectStore: std::fmt::Debug + Send + Sync {
    fn bucket(&self) -> &str;
    /// 🗑️ `Success(true)` iff exactly one object was reported deleted.
    async fn delete(&self, key: &str) -> StoreOutcome<bool>;
    /// 📤 Upload a file. `Success(etag)` only if the store hands back an ETag.
    async fn put(&self, key: &str, body: &Path) -> StoreOutcome<String>;
    /// 🔍 Up to `max_keys` objects, optionally under a prefix.
    async fn list(&self, prefix: Option<&str>, max_keys: i32) -> Result<Vec<ObjectSummary>>;
}

/// 🔴 The warehouse: send SQL, get `Ok(())` or a reason.
#[async_trait]
pub(crate) trait Warehouse: std::fmt::Debug + Send {
    async fn execute(&mut self, sql: &str) -> Result<()>;
}

// ===== Backend enums =====

/// 🎭 The many faces of a Source: Postgres in production, RAM in tests.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    Postgres(PostgresSource),
    #[cfg(test)]
    InMemory(InMemorySource),
}

#[async_trait]
impl Catalog for SourceBackend {
    async fn list_tables(&mut self) -> Result<Vec<CatalogTable>> {
        match self {
            SourceBackend::Postgres(pg) => pg.list_tables().await,
            #[cfg(test)]
            SourceBackend::InMemory(mem) => mem.list_tables().await,
        }
    }

    async fn list_columns(&mut self, table_name: &str) -> Result<Vec<CatalogColumn>> {
        match self {
            SourceBackend::Postgres(pg) => pg.list_columns(table_name).await,
            #[cfg(test)]
            SourceBackend::InMemory(mem) => mem.list_columns(table_name).await,
        }
    }
}

#[async_trait]
impl Source for SourceBackend {
    async fn copy_out(&mut self, query: &str) -> Result<ExportStream> {
        match self {
            SourceBackend::Postgres(pg) => pg.copy_out(query).await,
            #[cfg(test)]
            SourceBackend::InMemory(mem) => mem.copy_out(query).await,
        }
    }

    async fn reset(&mut self) -> Result<()> {
        match self {
            SourceBackend::Postgres(pg) => pg.reset().await,
            #[cfg(test)]
            SourceBackend::InMemory(mem) => mem.reset().await,
        }
    }
}

/// 🎭 The many faces of an ObjectStore: S3 (or anything that speaks it), or a BTreeMap.
#[derive(Debug)]
pub(crate) enum ObjectStoreBackend {
    S3(S3Store),
    #[cfg(test)]
    InMemory(InMemoryObjectStore),
}

#[async_trait]
impl ObjectStore for ObjectStoreBackend {
    fn bucket(&self) -> &str {
        match self {
            ObjectStoreBackend::S3(s3) => s3.bucket(),
            #[cfg(test)]
            ObjectStoreBackend::InMemory(mem) => mem.bucket(),
        }
    }

    async fn delete(&self, key: &str) -> StoreOutcome<bool> {
        match self {
            ObjectStoreBackend::S3(s3) => s3.delete(key).await,
            #[cfg(test)]
            ObjectStoreBackend::InMemory(mem) => mem.delete(key).await,
        }
    }

    async fn put(&self, key: &str, body: &Path) -> StoreOutcome<String> {
        match self {
            ObjectStoreBackend::S3(s3) => s3.put(key, body).await,
            #[cfg(test)]
            ObjectStoreBackend::InMemory(mem) => mem.put(key, body).await,
        }
    }

    async fn list(&self, prefix: Option<&str>, max_keys: i32) -> Result<Vec<ObjectSummary>> {
        match self {
            ObjectStoreBackend::S3(s3) => s3.list(prefix, max_keys).await,
            #[cfg(test)]
            ObjectStoreBackend::InMemory(mem) => mem.list(prefix, max_keys).await,
        }
    }
}

/// 🎭 The many faces of a Warehouse: Redshift, or a notebook that writes down every statement.
#[derive(Debug)]
pub(crate) enum WarehouseBackend {
    Redshift(RedshiftWarehouse),
    #[cfg(test)]
    InMemory(InMemoryWarehouse),
}

#[async_trait]
impl Warehouse for WarehouseBackend {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        match self {
            WarehouseBackend::Redshift(rs) => rs.execute(sql).await,
            #[cfg(test)]
            WarehouseBackend::InMemory(mem) => mem.execute(sql).await,
        }
    }
}

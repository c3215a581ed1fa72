// ai
//! 🐘➡️🔴 pgshift: Postgres tables, through S3, into Redshift. One table at a time.
//!
//! The library half of the workspace. The CLI loads an `AppConfig`, calls `run`, and
//! prints the `RunReport`. Everything else happens in here.

pub mod app_config;
pub mod backends;
pub mod common;
mod composers;
pub mod progress;
mod supervisors;
mod transforms;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::backends::{ObjectStore, S3Store};
use crate::common::ObjectSummary;
use crate::progress::RunReport;
use crate::supervisors::Supervisor;

/// 🔍 How many objects `list-objects` shows when nobody says otherwise.
pub const DEFAULT_LIST_MAX_KEYS: i32 = 500;

/// 🚀 Replicate every selected table. `only_tables` empty means "all of them".
pub async fn run(app_config: AppConfig, only_tables: &[String]) -> Result<RunReport> {
    let mut supervisor = Supervisor::connect(app_config)
        .await
        .context("💀 Could not connect the pipeline")?;
    supervisor.run(only_tables).await
}

/// 🪣 Peek into the export bucket.
pub async fn list_objects(
    app_config: &AppConfig,
    prefix: Option<&str>,
    max_keys: i32,
) -> Result<Vec<ObjectSummary>> {
    let store = S3Store::new(&app_config.object_store).await?;
    store.list(prefix, max_keys).await
}

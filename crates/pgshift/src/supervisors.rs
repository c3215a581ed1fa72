//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where tables must be copied..."
//! 🎬 "One supervisor dared to copy them all. One at a time. In order."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: part middle manager, part helicopter parent.
//!
//! For every table the catalog offers (minus the ones we were told to ignore):
//! 1. `CREATE TABLE IF NOT EXISTS` in the warehouse, so the swap has something to rename
//! 2. export it through the `ExportEngine`
//! 3. swap it in through the `LoadEngine`
//!
//! The first fatal error ends the run, and the error says which table did it.
//!
//! ⚠️ The workers stay private. Like Fight Club, but for async tasks.

mod exporter;
mod loader;
mod workers;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::{
    Catalog, ObjectStoreBackend, PostgresSource, RedshiftWarehouse, S3Store, SourceBackend, Warehouse,
    WarehouseBackend,
};
use crate::common::TableDescriptor;
use crate::composers::{self, CopyAuthorization};
use crate::progress::{RunReport, TableProgress, TableReport};
use crate::transforms;
use exporter::ExportEngine;
use loader::LoadEngine;

/// 📦 The Supervisor: owns the config, one source connection, one warehouse connection,
/// and a handle on the bucket. Hands each engine the slice of config it needs.
pub(crate) struct Supervisor {
    /// 🔧 The sacred scrolls of configuration, passed down from main()
    app_config: AppConfig,
    source: SourceBackend,
    store: Arc<ObjectStoreBackend>,
    warehouse: WarehouseBackend,
    show_progress: bool,
}

impl Supervisor {
    /// 🚀 Dial Postgres, Redshift and S3. Any of them missing is fatal before the first table.
    pub(crate) async fn connect(app_config: AppConfig) -> Result<Self> {
        let source = PostgresSource::new(app_config.source.clone())
            .await
            .context("💀 Could not open the source connection")?;
        let warehouse = RedshiftWarehouse::new(&app_config.target)
            .await
            .context("💀 Could not open the target connection")?;
        let store = S3Store::new(&app_config.object_store)
            .await
            .context("💀 Could not build the S3 client")?;

        let mut supervisor = Self::with_backends(
            app_config,
            SourceBackend::Postgres(source),
            ObjectStoreBackend::S3(store),
            WarehouseBackend::Redshift(warehouse),
        );
        supervisor.show_progress = true;
        Ok(supervisor)
    }

    pub(crate) fn with_backends(
        app_config: AppConfig,
        source: SourceBackend,
        store: ObjectStoreBackend,
        warehouse: WarehouseBackend,
    ) -> Self {
        Self {
            app_config,
            source,
            store: Arc::new(store),
            warehouse,
            show_progress: false,
        }
    }

    /// 🗂️ Ask the catalog what's out there, apply the filters, describe what survives.
    ///
    /// Returns the tables to replicate plus the names of tables skipped because
    /// nothing in them could be replicated.
    pub(crate) async fn discover_tables(
        &mut self,
        only_tables: &[String],
    ) -> Result<(Vec<TableDescriptor>, Vec<String>)> {
        let the_schema = self.app_config.source.schema.clone();
        let include_views = self.app_config.source.include_views;

        let the_catalog = self
            .source
            .list_tables()
            .await
            .context("💀 Could not read the source catalog")?
            .into_iter()
            .filter(|t| include_views || !t.is_view)
            .collect();
        let the_selected =
            transforms::select_tables(the_catalog, &self.app_config.runtime.skip_tables, only_tables);

        for wanted in only_tables {
            if !the_selected.iter().any(|t| &t.name == wanted) {
                warn!("🙈 --table {wanted} matched nothing replicable in schema '{the_schema}'");
            }
        }

        let mut the_tables = Vec::with_capacity(the_selected.len());
        let mut the_skipped = Vec::new();
        for candidate in the_selected {
            let the_columns = self
                .source
                .list_columns(&candidate.name)
                .await
                .context(format!("💀 Could not read the columns of {the_schema}.{}", candidate.name))?;
            match transforms::describe_table(
                &the_schema,
                &candidate.name,
                the_columns,
                &self.app_config.runtime.unsupported_types,
            ) {
                Some(table) => {
                    info!(
                        "📋 {table}: {} column(s){}",
                        table.columns.len(),
                        if candidate.is_view { " (view)" } else { "" }
                    );
                    the_tables.push(table);
                }
                None => {
                    warn!("🙈 skipping {the_schema}.{}: no replicable columns", candidate.name);
                    the_skipped.push(format!("{the_schema}.{}", candidate.name));
                }
            }
        }
        ensure_unique_targets(&the_tables)?;
        Ok((the_tables, the_skipped))
    }

    /// 🧵 The whole run. Strictly one table at a time.
    pub(crate) async fn run(&mut self, only_tables: &[String]) -> Result<RunReport> {
        let the_authorization = CopyAuthorization::from_config(&self.app_config.object_store)?;
        let the_exporter = ExportEngine::new(
            Arc::clone(&self.store),
            &self.app_config.object_store.export_prefix,
            &self.app_config.runtime,
        );
        let the_loader = LoadEngine::new(
            &self.app_config.target.schema,
            &self.app_config.object_store.bucket,
            self.app_config.runtime.load_mode,
            the_authorization,
        );

        let (the_tables, the_skipped) = self.discover_tables(only_tables).await?;
        info!("🚀 replicating {} table(s)", the_tables.len());

        let mut the_report = RunReport {
            tables: Vec::with_capacity(the_tables.len()),
            skipped: the_skipped,
        };

        for table in &the_tables {
            let the_table_report = self
                .replicate(table, &the_exporter, &the_loader)
                .await
                .context(format!("💀 Replication of {table} failed"))?;
            the_report.tables.push(the_table_report);
        }

        Ok(the_report)
    }

    async fn replicate(
        &mut self,
        table: &TableDescriptor,
        exporter: &ExportEngine,
        loader: &LoadEngine,
    ) -> Result<TableReport> {
        self.warehouse
            .execute(&composers::create_table_if_not_exists(
                &self.app_config.target.schema,
                table,
            ))
            .await
            .context(format!("💀 Could not ensure the target table {} exists", table.target_name))?;

        let mut the_progress = if self.show_progress {
            TableProgress::new(table.to_string())
        } else {
            TableProgress::hidden(table.to_string())
        };
        let the_export = exporter.export(&mut self.source, table, &mut the_progress).await;
        the_progress.finish();
        let the_export = the_export?;
        info!(
            "📦 {} exported: {} uncompressed bytes in {} chunk(s)",
            table.target_name,
            the_progress.uncompressed_bytes(),
            the_export.chunks.len()
        );

        loader
            .load(&mut self.warehouse, table, &the_export.artifact)
            .await?;

        Ok(TableReport {
            table: format!("{}.{}", table.schema, table.name),
            target: table.target_name.clone(),
            chunks: the_export.chunks.len(),
            uncompressed_bytes: the_export.uncompressed_bytes(),
            compressed_bytes: the_export.compressed_bytes(),
            elapsed: the_progress.elapsed(),
        })
    }
}

/// 🚫 Two sources, one target: the second swap would bury the first under `_updating`,
/// and both exports would write the same keys. Refused before anything is exported.
fn ensure_unique_targets(tables: &[TableDescriptor]) -> Result<()> {
    let mut the_claims: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for table in tables {
        the_claims
            .entry(table.target_name.as_str())
            .or_default()
            .push(format!("{}.{}", table.schema, table.name));
    }

    let the_collisions: Vec<String> = the_claims
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(target, sources)| format!("{target} <- {}", sources.join(", ")))
        .collect();
    if !the_collisions.is_empty() {
        bail!(
            "💀 More than one source table maps to the same target: {}. Add all but one of them to skip_tables.",
            the_collisions.join("; ")
        );
    }
    Ok(())
}

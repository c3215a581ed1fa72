use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::backends::common_config::quote_ident;
use crate::backends::{Catalog, CatalogColumn, CatalogTable, ExportStream, Source};

/// 📋 One fake table: catalog row, columns, and the exact buffers its export yields.
#[derive(Debug, Clone)]
struct InMemoryTable {
    table: CatalogTable,
    columns: Vec<CatalogColumn>,
    buffers: Vec<Bytes>,
}

/// 📦 The world's most cooperative database.
///
/// Tables are registered up front with the buffers their `COPY` should produce, split
/// however the test likes (mid-row splits welcome). `copy_out` finds the table by the
/// quoted name in the `FROM` clause and replays the buffers. Every query and every
/// `reset()` is recorded for later interrogation.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySource {
    tables: Vec<InMemoryTable>,
    queries: Arc<Mutex<Vec<String>>>,
    resets: Arc<Mutex<usize>>,
}

impl InMemorySource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 🏗️ Register a base table. Columns get ordinals in the order given.
    pub(crate) fn with_table(self, name: &str, columns: &[(&str, &str)], buffers: Vec<Bytes>) -> Self {
        self.with_relation(name, false, columns, buffers)
    }

    /// 👀 Register a view. Only listed by catalogs that were asked to include views, which
    /// for this one means always. Filtering is the supervisor's job.
    pub(crate) fn with_view(self, name: &str, columns: &[(&str, &str)], buffers: Vec<Bytes>) -> Self {
        self.with_relation(name, true, columns, buffers)
    }

    fn with_relation(
        mut self,
        name: &str,
        is_view: bool,
        columns: &[(&str, &str)],
        buffers: Vec<Bytes>,
    ) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(index, (column_name, data_type))| CatalogColumn {
                name: column_name.to_string(),
                data_type: data_type.to_string(),
                ordinal_position: index as i32 + 1,
            })
            .collect();
        self.tables.push(InMemoryTable {
            table: CatalogTable {
                name: name.to_string(),
                is_view,
            },
            columns,
            buffers,
        });
        self
    }

    /// 📜 Every `COPY` query issued so far, in order.
    pub(crate) async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }

    /// 🔄 How many times the session was reset.
    pub(crate) async fn resets(&self) -> usize {
        *self.resets.lock().await
    }
}

#[async_trait]
impl Catalog for InMemorySource {
    async fn list_tables(&mut self) -> Result<Vec<CatalogTable>> {
        Ok(self.tables.iter().map(|t| t.table.clone()).collect())
    }

    async fn list_columns(&mut self, table_name: &str) -> Result<Vec<CatalogColumn>> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.table.name == table_name)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn copy_out(&mut self, query: &str) -> Result<ExportStream> {
        self.queries.lock().await.push(query.to_string());

        let the_table = self
            .tables
            .iter()
            .find(|t| query.contains(&format!(".{})", quote_ident(&t.table.name))))
            .ok_or_else(|| anyhow!("💀 in-memory source has no table matching query: {query}"))?;

        let the_buffers: Vec<Result<Bytes>> = the_table.buffers.iter().cloned().map(Ok).collect();
        Ok(futures::stream::iter(the_buffers).boxed())
    }

    async fn reset(&mut self) -> Result<()> {
        *self.resets.lock().await += 1;
        Ok(())
    }
}

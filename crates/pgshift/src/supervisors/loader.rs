// ai
//! 🔄 The load engine: the rename-swap, inside one transaction.
//!
//! 🎬 *[the analysts are querying `orders`. they have no idea what's about to happen.]*
//! *[BEGIN. the old `orders` becomes `orders_updating`. a new `orders` appears, empty.]*
//! *[COPY. it fills. COMMIT.]*
//! *[the analysts refresh. new numbers. they never saw an empty table. magic.]*
//!
//! If anything in the middle fails, ROLLBACK puts every name back where it was.
//! The previous generation stays around as `<target>_updating` after a success and is
//! swept by the next run's first statement.

use anyhow::{Context, Result};
use tracing::{debug, error, info};

use crate::app_config::LoadMode;
use crate::backends::Warehouse;
use crate::common::{StagingArtifact, TableDescriptor};
use crate::composers::{self, CopyAuthorization};

#[derive(Debug)]
pub(crate) struct LoadEngine {
    target_schema: String,
    bucket: String,
    load_mode: LoadMode,
    authorization: CopyAuthorization,
}

impl LoadEngine {
    pub(crate) fn new(
        target_schema: &str,
        bucket: &str,
        load_mode: LoadMode,
        authorization: CopyAuthorization,
    ) -> Self {
        Self {
            target_schema: target_schema.to_string(),
            bucket: bucket.to_string(),
            load_mode,
            authorization,
        }
    }

    /// 🔄 Swap `artifact` in as the new contents of `table`'s target.
    pub(crate) async fn load<W: Warehouse>(
        &self,
        warehouse: &mut W,
        table: &TableDescriptor,
        artifact: &StagingArtifact,
    ) -> Result<()> {
        info!("🔴 importing {}", table.target_name);
        let the_statements = composers::swap_statements(
            &self.target_schema,
            table,
            &self.bucket,
            artifact,
            self.load_mode,
            &self.authorization,
        );

        warehouse
            .execute("BEGIN")
            .await
            .context(format!("💀 Could not open the load transaction for {}", table.target_name))?;

        for statement in &the_statements {
            debug!("🔴 {}: {}", statement.step, statement.loggable);
            if let Err(err) = warehouse.execute(&statement.sql).await {
                error!("💀 {} failed for {}, rolling back", statement.step, table.target_name);
                if let Err(rollback_err) = warehouse.execute("ROLLBACK").await {
                    error!("💀 ROLLBACK failed too: {rollback_err:#}");
                }
                return Err(err.context(format!(
                    "💀 Load of {} failed at step '{}': {}",
                    table.target_name, statement.step, statement.loggable
                )));
            }
        }

        warehouse
            .execute("COMMIT")
            .await
            .context(format!("💀 Could not commit the load of {}", table.target_name))?;
        info!("✅ {} swapped in", table.target_name);
        Ok(())
    }
}
